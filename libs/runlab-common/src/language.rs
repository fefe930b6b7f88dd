use serde::{Deserialize, Serialize};
use std::fmt;

/// Languages the sandbox knows how to run. Anything else a session is
/// configured with is carried as `Other` and routed to the baseline endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Other(String),
}

/// Used when neither session configuration nor keyword detection decides.
pub const BASELINE_LANGUAGE: Language = Language::JavaScript;

pub const EXECUTE_PATH_PREFIX: &str = "/api/execute";
pub const VALIDATE_PATH: &str = "/api/validate";

const JAVA_MARKERS: &[&str] = &["public class ", "public static void main", "System.out."];
const PYTHON_LINE_PREFIXES: &[&str] = &["import ", "from ", "def ", "elif ", "print("];
// Weak hints: JavaScript markers take precedence over these.
const PYTHON_MARKERS: &[&str] = &["print(", "input(", "range("];
const JAVASCRIPT_MARKERS: &[&str] = &["function", "console.", "const ", "let ", "=>", "var "];

impl Language {
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "python" | "py" | "python3" => Language::Python,
            "javascript" | "js" | "node" => Language::JavaScript,
            "java" => Language::Java,
            other => Language::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Other(name) => name,
        }
    }

    /// Keyword heuristics over the code text. Returns `None` when nothing
    /// matched so the caller can fall back to the baseline.
    pub fn detect(code: &str) -> Option<Self> {
        if JAVA_MARKERS.iter().any(|m| code.contains(m)) {
            return Some(Language::Java);
        }

        let python_line = code.lines().map(str::trim_start).any(|line| {
            PYTHON_LINE_PREFIXES
                .iter()
                .any(|prefix| line.starts_with(prefix))
        });
        if python_line {
            return Some(Language::Python);
        }

        if JAVASCRIPT_MARKERS.iter().any(|m| code.contains(m)) {
            return Some(Language::JavaScript);
        }

        if PYTHON_MARKERS.iter().any(|m| code.contains(m)) {
            return Some(Language::Python);
        }

        None
    }

    /// Execution endpoint for this language. Unknown languages share the
    /// baseline language's path.
    pub fn endpoint_path(&self) -> &'static str {
        match self {
            Language::Python => "/api/execute/python",
            Language::Java => "/api/execute/java",
            Language::JavaScript | Language::Other(_) => "/api/execute/javascript",
        }
    }

    /// Endpoint variant used for running a single test case.
    pub fn test_endpoint_path(&self) -> String {
        format!("{}/test", self.endpoint_path())
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for Language {
    fn from(name: String) -> Self {
        Language::from_name(&name)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_python_family() {
        assert_eq!(Language::detect("print(1)"), Some(Language::Python));
        assert_eq!(Language::detect("import math\nx = 1"), Some(Language::Python));
        assert_eq!(Language::detect("def f():\n    return 1"), Some(Language::Python));
    }

    #[test]
    fn test_detect_javascript_family() {
        assert_eq!(Language::detect("function f() { return 1; }"), Some(Language::JavaScript));
        assert_eq!(Language::detect("console.log(1)"), Some(Language::JavaScript));
    }

    #[test]
    fn test_javascript_wins_over_loose_python_hints() {
        let class = "class Counter {\n  constructor() { this.n = 0; }\n  inc() { console.log(this.n); }\n}";
        assert_eq!(Language::detect(class), Some(Language::JavaScript));

        let range = "function range(n) { return [...Array(n).keys()]; }\nconsole.log(range(3));";
        assert_eq!(Language::detect(range), Some(Language::JavaScript));

        assert_eq!(Language::detect("x = input()\ny = range(3)"), Some(Language::Python));
    }

    #[test]
    fn test_detect_java() {
        let code = "public class Main { public static void main(String[] a) { System.out.println(1); } }";
        assert_eq!(Language::detect(code), Some(Language::Java));
    }

    #[test]
    fn test_detect_nothing() {
        assert_eq!(Language::detect("1 + 1"), None);
    }

    #[test]
    fn test_endpoint_table() {
        assert_eq!(Language::Python.endpoint_path(), "/api/execute/python");
        assert_eq!(Language::JavaScript.endpoint_path(), "/api/execute/javascript");
        assert_eq!(
            Language::Other("cobol".to_string()).endpoint_path(),
            BASELINE_LANGUAGE.endpoint_path()
        );
        assert_eq!(Language::Python.test_endpoint_path(), "/api/execute/python/test");
    }

    #[test]
    fn test_serde_as_lowercase_name() {
        assert_eq!(serde_json::to_string(&Language::Python).unwrap(), r#""python""#);
        let lang: Language = serde_json::from_str(r#""JS""#).unwrap();
        assert_eq!(lang, Language::JavaScript);
        let lang: Language = serde_json::from_str(r#""cobol""#).unwrap();
        assert_eq!(lang, Language::Other("cobol".to_string()));
    }
}
