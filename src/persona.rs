/// The fixed set of expert personas a session can talk to.
///
/// Each persona bundles a system prompt with display metadata. The set is
/// closed; there is no runtime registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persona {
    #[default]
    General,
    Programmer,
    Teacher,
    MedicalAdvisor,
    Chef,
    BusinessConsultant,
    Writer,
}

impl Persona {
    pub fn all() -> Vec<Persona> {
        vec![
            Persona::General,
            Persona::Programmer,
            Persona::Teacher,
            Persona::MedicalAdvisor,
            Persona::Chef,
            Persona::BusinessConsultant,
            Persona::Writer,
        ]
    }

    /// Short stable key, used in the config file.
    pub fn key(&self) -> &'static str {
        match self {
            Persona::General => "general",
            Persona::Programmer => "programmer",
            Persona::Teacher => "teacher",
            Persona::MedicalAdvisor => "medical",
            Persona::Chef => "chef",
            Persona::BusinessConsultant => "business",
            Persona::Writer => "writer",
        }
    }

    pub fn from_key(s: &str) -> Option<Self> {
        let s = s.trim().to_lowercase();
        Persona::all().into_iter().find(|p| p.key() == s)
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Persona::General => "🤖",
            Persona::Programmer => "💻",
            Persona::Teacher => "📚",
            Persona::MedicalAdvisor => "⚕️",
            Persona::Chef => "🍳",
            Persona::BusinessConsultant => "💼",
            Persona::Writer => "✍️",
        }
    }

    /// Label shown in the persona picker
    pub fn label(&self) -> &'static str {
        match self {
            Persona::General => "General AI",
            Persona::Programmer => "Programmer",
            Persona::Teacher => "Teacher",
            Persona::MedicalAdvisor => "Medical Advisor",
            Persona::Chef => "Chef",
            Persona::BusinessConsultant => "Business Consultant",
            Persona::Writer => "Writer",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Persona::General => "General AI Assistant",
            Persona::Programmer => "Programming Expert",
            Persona::Teacher => "Education Expert",
            Persona::MedicalAdvisor => "Medical Knowledge Advisor",
            Persona::Chef => "Culinary Expert",
            Persona::BusinessConsultant => "Business Strategist",
            Persona::Writer => "Writing Expert",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Persona::General => "Handles a broad range of general questions",
            Persona::Programmer => "Specialised in programming and technical questions",
            Persona::Teacher => "Best for learning and education",
            Persona::MedicalAdvisor => "General health and medical information",
            Persona::Chef => "Specialised in cooking and recipes",
            Persona::BusinessConsultant => "Advice on business and management",
            Persona::Writer => "Specialised in writing and editing",
        }
    }

    pub fn system_prompt(&self) -> &'static str {
        match self {
            Persona::General => {
                "You are a kind and knowledgeable AI assistant. Answer the user's questions \
                 accurately and in clear, easy-to-understand language."
            }
            Persona::Programmer => {
                "You are an experienced senior programmer. Give practical, concrete advice on \
                 coding, debugging and architecture design. Include code examples in your \
                 explanations."
            }
            Persona::Teacher => {
                "You are an excellent teacher. Explain complex concepts clearly and step by \
                 step. Use analogies and diagrams so that beginners can follow along."
            }
            Persona::MedicalAdvisor => {
                "You are an advisor with broad medical knowledge. Provide general information \
                 about health and medicine, and always include a note recommending that the \
                 user consult a medical specialist."
            }
            Persona::Chef => {
                "You are an experienced professional chef. Give practical advice on recipes, \
                 cooking techniques and choosing ingredients. Include concrete steps and \
                 cooking tips."
            }
            Persona::BusinessConsultant => {
                "You are an experienced business consultant. Give practical, data-driven \
                 advice on business strategy, marketing and operational improvement."
            }
            Persona::Writer => {
                "You are a professional writer and editor. Give concrete advice on writing, \
                 editing and proofreading engaging, readable text, and suggest improved \
                 versions of the user's text."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_round_trip() {
        for persona in Persona::all() {
            assert_eq!(Persona::from_key(persona.key()), Some(persona));
        }
    }

    #[test]
    fn test_keys_are_unique() {
        let mut keys: Vec<&str> = Persona::all().iter().map(|p| p.key()).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), Persona::all().len());
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(Persona::from_key("astronaut"), None);
        assert_eq!(Persona::from_key(" Chef "), Some(Persona::Chef));
    }

    #[test]
    fn test_medical_prompt_recommends_specialist() {
        assert!(Persona::MedicalAdvisor.system_prompt().contains("specialist"));
    }
}
