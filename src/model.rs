/// The completion model tiers offered in the model picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Model {
    #[default]
    Gpt4oMini,
    Gpt4o,
    Gpt35Turbo,
}

impl Model {
    /// Identifier sent to the completion API
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::Gpt4oMini => "gpt-4o-mini",
            Model::Gpt4o => "gpt-4o",
            Model::Gpt35Turbo => "gpt-3.5-turbo",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "gpt-4o-mini" => Some(Model::Gpt4oMini),
            "gpt-4o" => Some(Model::Gpt4o),
            "gpt-3.5-turbo" => Some(Model::Gpt35Turbo),
            _ => None,
        }
    }

    pub fn all() -> Vec<Model> {
        vec![Model::Gpt4oMini, Model::Gpt4o, Model::Gpt35Turbo]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Model::Gpt4oMini => "GPT-4o mini (fast)",
            Model::Gpt4o => "GPT-4o",
            Model::Gpt35Turbo => "GPT-3.5 Turbo (legacy)",
        }
    }
}
