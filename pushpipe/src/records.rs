//! Filters over string-keyed records.
//!
//! Row-shaped data moving between external sources and sinks travels as JSON
//! object maps; these filters reshape such records in flight.

use regex::Regex;
use serde::Serialize;

use crate::errors::Failure;
use crate::filter::{map, try_map};
use crate::graph::Node;

/// A row-shaped item: an ordered map from column name to JSON value.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Renames record keys by regex rules.
///
/// Each key is matched against the rules in order and the first matching rule
/// rewrites it (capture groups are available in the replacement as `${1}`…).
/// Matches are computed against the original key set, so a pair of rules may
/// swap two keys in a single pass. Keys matching no rule pass through
/// untouched.
#[must_use]
pub fn rename_keys(rules: Vec<(Regex, String)>) -> Node<Record, Record> {
    map(move |record: Record| {
        let mut renamed = Record::new();
        for (key, value) in record {
            let new_key = rules.iter().find_map(|(pattern, replacement)| {
                pattern
                    .is_match(&key)
                    .then(|| pattern.replace(&key, replacement.as_str()).into_owned())
            });
            renamed.insert(new_key.unwrap_or(key), value);
        }
        renamed
    })
}

/// Serializes each item into a [`Record`], failing the pipeline on items that
/// do not serialize to a JSON object.
#[must_use]
pub fn to_records<T>() -> Node<T, Record>
where
    T: Serialize + 'static,
{
    try_map(|item: T| match serde_json::to_value(&item)? {
        serde_json::Value::Object(record) => Ok(record),
        other => Err(Failure::msg(format!(
            "expected a record-shaped item, got {other}"
        ))
        .into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::appender;
    use crate::source::{iter_source, Source};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn record(pairs: &[(&str, i64)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::json!(v)))
            .collect()
    }

    #[test]
    fn test_rename_applies_capture_groups() {
        let results: Rc<RefCell<Vec<Record>>> = Rc::new(RefCell::new(Vec::new()));
        let rules = vec![(
            Regex::new(r"^key_([0-9]+)$").unwrap(),
            "${1}_new".to_string(),
        )];
        iter_source([record(&[("key_1", 1), ("key_2", 2), ("key_3", 3)])])
            .connect(rename_keys(rules).pipe(appender(Rc::clone(&results))))
            .unwrap();
        let mut keys: Vec<String> = results.borrow()[0].keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["1_new", "2_new", "3_new"]);
    }

    #[test]
    fn test_parallel_rules_swap_keys() {
        let results: Rc<RefCell<Vec<Record>>> = Rc::new(RefCell::new(Vec::new()));
        let rules = vec![
            (Regex::new(r"^key_1$").unwrap(), "key_2".to_string()),
            (Regex::new(r"^key_2$").unwrap(), "key_1".to_string()),
        ];
        iter_source([record(&[("key_1", 1), ("key_2", 2), ("key_3", 3)])])
            .connect(rename_keys(rules).pipe(appender(Rc::clone(&results))))
            .unwrap();
        assert_eq!(
            results.borrow()[0],
            record(&[("key_1", 2), ("key_2", 1), ("key_3", 3)])
        );
    }

    #[test]
    fn test_to_records_serializes_structs() {
        #[derive(Serialize)]
        struct Row {
            id: i64,
            name: String,
        }

        let results: Rc<RefCell<Vec<Record>>> = Rc::new(RefCell::new(Vec::new()));
        iter_source([Row {
            id: 7,
            name: "seven".to_string(),
        }])
        .connect(to_records().pipe(appender(Rc::clone(&results))))
        .unwrap();
        assert_eq!(results.borrow()[0]["id"], serde_json::json!(7));
        assert_eq!(results.borrow()[0]["name"], serde_json::json!("seven"));
    }

    #[test]
    fn test_to_records_rejects_non_objects() {
        let err = iter_source([42i64])
            .connect(to_records::<i64>().pipe(null_record()))
            .unwrap_err();
        assert!(err.as_failure().is_some());
    }

    fn null_record() -> Node<Record> {
        crate::sinks::null()
    }
}
