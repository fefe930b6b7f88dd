/// Test Evaluator - Result Comparison
///
/// **Core Responsibility:**
/// Decide whether a test case's actual value matches its expected value.
///
/// **Comparison Rules:**
/// - Expected text: both sides trimmed, then exact string equality
/// - Expected list: order- and type-sensitive serialized equality
/// - Anything else: strict value equality (no numeric/string coercion)
///
/// Knows nothing about HTTP or the sandbox. Pure functions only.
use crate::client::TestRun;
use crate::error::SubmissionError;
use runlab_common::types::{ExpectedValue, TestCase, TestResult};
use serde_json::Value;

fn normalize_output(output: &str) -> &str {
    output.trim()
}

/// Text form of an actual value. Strings are taken verbatim, other values
/// use their JSON rendering.
fn actual_as_text(actual: &Value) -> String {
    match actual {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn compare_results(expected: &ExpectedValue, actual: &Value) -> bool {
    match expected {
        ExpectedValue::Text(text) => {
            normalize_output(text) == normalize_output(&actual_as_text(actual))
        }
        ExpectedValue::List(items) => match actual {
            Value::Array(actual_items) => {
                serialize(items.as_slice()) == serialize(actual_items.as_slice())
            }
            _ => false,
        },
        ExpectedValue::Primitive(value) => value == actual,
    }
}

fn serialize(items: &[Value]) -> String {
    // Value always serializes; an empty string would only compare equal to
    // another failure, which cannot happen for well-formed JSON values.
    serde_json::to_string(items).unwrap_or_default()
}

/// Turn one test execution (or its failure) into a TestResult.
pub fn evaluate_test(test_case: &TestCase, run: Result<TestRun, SubmissionError>) -> TestResult {
    let expected = test_case.expected_value.to_value();
    match run {
        Ok(run) => TestResult {
            test_name: test_case.name.clone(),
            passed: compare_results(&test_case.expected_value, &run.actual),
            expected,
            actual: run.actual,
            execution_time_ms: run.elapsed_ms,
            error_message: None,
        },
        Err(e) => TestResult {
            test_name: test_case.name.clone(),
            passed: false,
            expected,
            actual: Value::Null,
            execution_time_ms: 0,
            error_message: Some(e.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_test_case(name: &str, expected_value: ExpectedValue) -> TestCase {
        TestCase {
            name: name.to_string(),
            setup_code: None,
            assertion_code: "result = f()".to_string(),
            expected_value,
        }
    }

    #[test]
    fn test_normalize_output() {
        assert_eq!(normalize_output("  hello  \n"), "hello");
        assert_eq!(normalize_output("   "), "");
    }

    #[test]
    fn test_text_comparison_trims() {
        let expected = ExpectedValue::Text("hello ".to_string());
        assert!(compare_results(&expected, &json!("  hello\n")));
        assert!(!compare_results(&expected, &json!("Hello")));
    }

    #[test]
    fn test_text_comparison_with_non_string_actual() {
        let expected = ExpectedValue::Text("42".to_string());
        assert!(compare_results(&expected, &json!(42)));
    }

    #[test]
    fn test_list_comparison() {
        let expected = ExpectedValue::List(vec![json!(1), json!(2), json!(3)]);
        assert!(compare_results(&expected, &json!([1, 2, 3])));
        assert!(!compare_results(&expected, &json!([1, 2, 3, 4])));
        assert!(!compare_results(&expected, &json!([3, 2, 1])));
        assert!(!compare_results(&expected, &json!(["1", "2", "3"])));
        assert!(!compare_results(&expected, &json!("[1,2,3]")));
    }

    #[test]
    fn test_primitive_comparison_is_strict() {
        let expected = ExpectedValue::Primitive(json!(1));
        assert!(compare_results(&expected, &json!(1)));
        assert!(!compare_results(&expected, &json!("1")));
        assert!(!compare_results(&expected, &json!(true)));

        let expected = ExpectedValue::Primitive(json!(false));
        assert!(compare_results(&expected, &json!(false)));
        assert!(!compare_results(&expected, &Value::Null));
    }

    #[test]
    fn test_comparison_is_reflexive() {
        let samples = vec![
            ExpectedValue::Text("  padded ".to_string()),
            ExpectedValue::Text(String::new()),
            ExpectedValue::List(vec![json!(1), json!("a"), json!([true, null]), json!({"k": 2})]),
            ExpectedValue::List(Vec::new()),
            ExpectedValue::Primitive(json!(3.5)),
            ExpectedValue::Primitive(json!(null)),
            ExpectedValue::Primitive(json!({"nested": [1, 2]})),
        ];
        for expected in samples {
            assert!(compare_results(&expected, &expected.to_value()), "{:?}", expected);
        }
    }

    #[test]
    fn test_evaluate_test_pass_and_fail() {
        let case = make_test_case("sum", ExpectedValue::List(vec![json!(1), json!(2)]));

        let result = evaluate_test(&case, Ok(TestRun { actual: json!([1, 2]), elapsed_ms: 12 }));
        assert!(result.passed);
        assert_eq!(result.execution_time_ms, 12);
        assert_eq!(result.expected, json!([1, 2]));

        let result = evaluate_test(&case, Ok(TestRun { actual: json!([2, 1]), elapsed_ms: 3 }));
        assert!(!result.passed);
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_evaluate_test_error_becomes_failed_result() {
        let case = make_test_case("boom", ExpectedValue::Text("x".to_string()));
        let result = evaluate_test(&case, Err(SubmissionError::TestExecution("timed out".to_string())));

        assert!(!result.passed);
        assert_eq!(result.actual, Value::Null);
        assert_eq!(result.error_message.as_deref(), Some("Test execution failed: timed out"));
    }
}
