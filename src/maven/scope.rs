use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::maven::error::ModelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Compile,
    Provided,
    Runtime,
    Test,
    System,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Compile => "compile",
            Scope::Provided => "provided",
            Scope::Runtime => "runtime",
            Scope::Test => "test",
            Scope::System => "system",
        }
    }

    /// The scope an edge declared with `self` ends up with when it is reached through a path
    ///  whose scope so far is `path_scope`. `None` means the edge and everything beneath it
    ///  is dropped for this path.
    pub fn transitive_of(self, path_scope: Option<Scope>) -> Option<Scope> {
        let path_scope = match path_scope {
            None => return Some(self),
            Some(s) => s,
        };

        match (path_scope, self) {
            (Scope::System, _) => None,
            (_, Scope::Provided | Scope::Test | Scope::System) => None,
            (Scope::Compile, edge) => Some(edge),
            (Scope::Runtime, _) => Some(Scope::Runtime),
            (Scope::Provided, _) => Some(Scope::Provided),
            (Scope::Test, _) => Some(Scope::Test),
        }
    }

    /// edges with these scopes propagate their own dependencies further
    pub fn is_transitive(self) -> bool {
        matches!(self, Scope::Compile | Scope::Runtime)
    }

    /// whether a dependency resolved with `self` belongs on the classpath of `view`
    pub fn is_in_classpath_of(self, view: Scope) -> bool {
        match view {
            Scope::Compile | Scope::Provided => matches!(self, Scope::Compile | Scope::Provided | Scope::System),
            Scope::Runtime => matches!(self, Scope::Compile | Scope::Runtime),
            Scope::Test => true,
            Scope::System => matches!(self, Scope::Compile | Scope::System),
        }
    }
}

/// Applied at every graph edge: `path_scope` is how the current node was reached (`None` for
///  the root's own dependencies), `edge_scope` is what the outgoing dependency declares.
pub fn combine(path_scope: Option<Scope>, edge_scope: Scope) -> Option<Scope> {
    edge_scope.transitive_of(path_scope)
}

impl FromStr for Scope {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compile" => Ok(Scope::Compile),
            "provided" => Ok(Scope::Provided),
            "runtime" => Ok(Scope::Runtime),
            "test" => Ok(Scope::Test),
            "system" => Ok(Scope::System),
            other => Err(ModelError::InvalidScope(other.to_string())),
        }
    }
}

impl Display for Scope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use super::*;
    use super::Scope::*;

    #[rstest]
    #[case::compile_compile(Compile, Compile, Some(Compile))]
    #[case::compile_runtime(Compile, Runtime, Some(Runtime))]
    #[case::compile_provided(Compile, Provided, None)]
    #[case::compile_test(Compile, Test, None)]
    #[case::compile_system(Compile, System, None)]
    #[case::provided_compile(Provided, Compile, Some(Provided))]
    #[case::provided_runtime(Provided, Runtime, Some(Provided))]
    #[case::provided_provided(Provided, Provided, None)]
    #[case::provided_test(Provided, Test, None)]
    #[case::provided_system(Provided, System, None)]
    #[case::runtime_compile(Runtime, Compile, Some(Runtime))]
    #[case::runtime_runtime(Runtime, Runtime, Some(Runtime))]
    #[case::runtime_provided(Runtime, Provided, None)]
    #[case::runtime_test(Runtime, Test, None)]
    #[case::runtime_system(Runtime, System, None)]
    #[case::test_compile(Test, Compile, Some(Test))]
    #[case::test_runtime(Test, Runtime, Some(Test))]
    #[case::test_provided(Test, Provided, None)]
    #[case::test_test(Test, Test, None)]
    #[case::test_system(Test, System, None)]
    #[case::system_compile(System, Compile, None)]
    #[case::system_runtime(System, Runtime, None)]
    #[case::system_provided(System, Provided, None)]
    #[case::system_test(System, Test, None)]
    #[case::system_system(System, System, None)]
    fn test_combine(#[case] path_scope: Scope, #[case] edge_scope: Scope, #[case] expected: Option<Scope>) {
        assert_eq!(combine(Some(path_scope), edge_scope), expected);
    }

    #[rstest]
    fn test_combine_at_root(#[values(Compile, Provided, Runtime, Test, System)] edge_scope: Scope) {
        assert_eq!(combine(None, edge_scope), Some(edge_scope));
    }

    #[rstest]
    #[case::compile("compile", Some(Compile))]
    #[case::provided("provided", Some(Provided))]
    #[case::runtime("runtime", Some(Runtime))]
    #[case::test("test", Some(Test))]
    #[case::system("system", Some(System))]
    #[case::uppercase("Compile", None)]
    #[case::import("import", None)]
    #[case::empty("", None)]
    fn test_parse(#[case] s: &str, #[case] expected: Option<Scope>) {
        match expected {
            Some(expected) => {
                assert_eq!(s.parse::<Scope>().unwrap(), expected);
                assert_eq!(expected.to_string(), s);
            }
            None => assert_eq!(s.parse::<Scope>(), Err(ModelError::InvalidScope(s.to_string()))),
        }
    }

    #[rstest]
    #[case::compile_in_runtime(Compile, Runtime, true)]
    #[case::runtime_in_runtime(Runtime, Runtime, true)]
    #[case::test_in_runtime(Test, Runtime, false)]
    #[case::provided_in_runtime(Provided, Runtime, false)]
    #[case::runtime_in_compile(Runtime, Compile, false)]
    #[case::provided_in_compile(Provided, Compile, true)]
    #[case::test_in_test(Test, Test, true)]
    fn test_is_in_classpath_of(#[case] scope: Scope, #[case] view: Scope, #[case] expected: bool) {
        assert_eq!(scope.is_in_classpath_of(view), expected);
    }
}
