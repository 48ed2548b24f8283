use ads_catalog::CreativeSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision", content = "reason")]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }

    /// Append the window to a deny reason so rules sharing a cap wording stay
    /// distinguishable.
    pub(crate) fn qualified(self, window: &str) -> Self {
        match self {
            Decision::Allow => Decision::Allow,
            Decision::Deny(reason) => Decision::Deny(format!("{reason} {window}")),
        }
    }
}

/// Sets that every rule allowed, in evaluation order.
pub fn allow_list(results: &[(CreativeSet, Decision)]) -> Vec<CreativeSet> {
    results
        .iter()
        .filter(|(_, d)| d.is_allowed())
        .map(|(set, _)| set.clone())
        .collect()
}

/// `(creative_set_id, reason)` for every excluded set.
pub fn deny_reasons(results: &[(CreativeSet, Decision)]) -> Vec<(String, String)> {
    results
        .iter()
        .filter_map(|(set, d)| {
            d.reason()
                .map(|r| (set.creative_set_id.clone(), r.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_results() {
        let results = vec![
            (CreativeSet::new("a", 1, 1), Decision::Allow),
            (CreativeSet::new("b", 1, 1), Decision::Deny("capped".into())),
            (CreativeSet::new("c", 1, 1), Decision::Allow),
        ];
        let allowed: Vec<_> = allow_list(&results)
            .into_iter()
            .map(|s| s.creative_set_id)
            .collect();
        assert_eq!(allowed, vec!["a", "c"]);
        assert_eq!(deny_reasons(&results), vec![("b".to_string(), "capped".to_string())]);
    }

    #[test]
    fn test_serialized_shape() {
        let json = serde_json::to_string(&Decision::Deny("nope".into())).expect("serialize");
        assert_eq!(json, r#"{"decision":"deny","reason":"nope"}"#);
    }
}
