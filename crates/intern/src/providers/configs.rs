/// Settings for an OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

impl OpenAiProviderConfig {
    /// Same endpoint and credentials, different model
    pub fn for_model<S: Into<String>>(&self, model: S) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }
}
