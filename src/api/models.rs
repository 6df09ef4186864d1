/// Models accepted by the chat completions endpoint, most capable first.
pub const AVAILABLE_MODELS: &[&str] = &[
    "sonar-reasoning-pro",
    "sonar-reasoning",
    "sonar-pro",
    "sonar",
    "sonar-deep-research",
];

pub const DEFAULT_MODEL: &str = "sonar-pro";

pub fn is_valid_model(model: &str) -> bool {
    AVAILABLE_MODELS.contains(&model)
}

pub fn available_models_string() -> String {
    AVAILABLE_MODELS.join(", ")
}

/// Models whose name starts with `prefix`, for command completion.
pub fn matching_models(prefix: &str) -> Vec<&'static str> {
    let prefix = prefix.to_ascii_lowercase();
    AVAILABLE_MODELS
        .iter()
        .copied()
        .filter(|model| model.starts_with(&prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_known_models() {
        assert!(is_valid_model("sonar-pro"));
        assert!(is_valid_model("sonar-deep-research"));
        assert!(!is_valid_model("gpt-4o"));
        assert!(!is_valid_model(""));
        assert!(!is_valid_model("SONAR"));
    }

    #[test]
    fn default_model_is_in_catalogue() {
        assert!(is_valid_model(DEFAULT_MODEL));
    }

    #[test]
    fn models_string_lists_everything() {
        let listed = available_models_string();
        for model in AVAILABLE_MODELS {
            assert!(listed.contains(model));
        }
        assert!(listed.contains(", "));
    }

    #[test]
    fn matching_models_filters_by_prefix() {
        assert_eq!(
            matching_models("sonar-r"),
            vec!["sonar-reasoning-pro", "sonar-reasoning"]
        );
        assert_eq!(matching_models("x"), Vec::<&str>::new());
        assert_eq!(matching_models("").len(), AVAILABLE_MODELS.len());
    }
}
