use proptest::prelude::*;
use sdk::errors::{EngineError, LoomErrorExt};
use sdk::{SkillInput, SkillOutput};
use serde_json::json;

proptest! {
    #[test]
    fn test_error_user_hint_completeness(error_str in "\\PC*", count in 0..100usize) {
        let errs = vec![
            EngineError::Config(error_str.clone()),
            EngineError::LLMProvider(error_str.clone()),
            EngineError::OracleParse(error_str.clone()),
            EngineError::UnknownSkill(error_str.clone()),
            EngineError::MissingInput { skill: error_str.clone(), field: error_str.clone() },
            EngineError::SkillFailed { skill: error_str.clone(), reason: error_str.clone() },
            EngineError::CriticalSkillFailed { skill: error_str.clone(), reason: error_str.clone() },
            EngineError::InvalidStateKey(error_str.clone()),
            EngineError::PlanningFailed(error_str.clone()),
            EngineError::RepairDepthExceeded { key: error_str.clone(), limit: count },
            EngineError::IterationLimit(count),
            EngineError::RuleLoad(error_str.clone()),
            EngineError::CommitBlocked { violations: count },
            EngineError::GateExhausted { attempts: count, score: 0 },
        ];

        for err in errs {
            prop_assert!(!err.user_hint().is_empty());
            // Display always carries the variant's own wording
            prop_assert!(!err.to_string().is_empty());
        }
    }

    #[test]
    fn test_abort_errors_are_not_recoverable(skill in "[a-zA-Z]{1,12}", reason in "\\PC*") {
        let critical = EngineError::CriticalSkillFailed { skill: skill.clone(), reason: reason.clone() };
        let plain = EngineError::SkillFailed { skill, reason };
        prop_assert!(!critical.is_recoverable());
        prop_assert!(plain.is_recoverable());
    }

    #[test]
    fn test_skill_output_reports_every_update(
        keys in prop::collection::btree_set("[a-z]{1,8}(\\.[a-z]{1,8})?", 0..6),
    ) {
        let output = keys
            .iter()
            .fold(SkillOutput::empty(), |out, key| out.with_update(key.as_str(), json!(key)));

        let mut produced: Vec<&str> = output.produced_keys().collect();
        produced.sort_unstable();
        let expected: Vec<&str> = keys.iter().map(String::as_str).collect();
        prop_assert_eq!(produced, expected);
    }

    #[test]
    fn test_skill_input_has_ignores_null(key in "[a-zA-Z]{1,10}", text in "\\PC*") {
        let input = SkillInput::new()
            .with_param(key.as_str(), json!(text))
            .with_param("nothing", serde_json::Value::Null);

        prop_assert!(input.has(&key) || key == "nothing");
        prop_assert!(!input.has("nothing") || key == "nothing");
        if key != "nothing" {
            prop_assert_eq!(input.param_str(&key).unwrap(), text.as_str());
        }
    }
}
