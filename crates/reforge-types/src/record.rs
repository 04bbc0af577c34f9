//! The run record: the state artifact written after every applied decision.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::TaskResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// UUIDv7 of the engine run that wrote this record.
    pub run_id: Uuid,
    pub step_id: String,
    /// 1-based attempt number of the step within this run.
    pub attempt: u32,
    /// Final decision string of the attempt.
    pub decision: String,
    pub results: BTreeMap<String, TaskResult>,
    pub execution_order: Vec<String>,
    /// Baseline in effect after the decision was applied.
    pub baseline: PathBuf,
    /// True when this decision stopped the engine.
    pub halted: bool,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_record_json_shape() {
        let mut results = BTreeMap::new();
        results.insert(
            "build".to_string(),
            TaskResult::success(serde_json::json!({"exit_code": 0}), "ok"),
        );
        let record = RunRecord {
            run_id: Uuid::now_v7(),
            step_id: "s1".to_string(),
            attempt: 2,
            decision: "approve".to_string(),
            results,
            execution_order: vec!["build".to_string()],
            baseline: PathBuf::from("/work/s1"),
            halted: false,
            recorded_at: Utc::now(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["step_id"], "s1");
        assert_eq!(value["attempt"], 2);
        assert_eq!(value["results"]["build"]["status"], "success");
        assert_eq!(value["execution_order"][0], "build");

        let back: RunRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
