//! Built-in runner backed by locally installed compilers and interpreters.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;

use super::{CommandSpec, Language, LanguageRunner, RunPlan, SourceTransform};
use crate::config::ToolchainConfig;
use crate::models::ids::RunId;
use crate::Result;

/// Runner that lays every run out flat inside one shared temp directory.
#[derive(Debug, Clone)]
pub struct ToolchainRunner {
    temp_dir: PathBuf,
    toolchain: ToolchainConfig,
}

impl ToolchainRunner {
    /// Create a runner writing into `temp_dir` with the given binaries.
    #[must_use]
    pub fn new(temp_dir: impl Into<PathBuf>, toolchain: ToolchainConfig) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            toolchain,
        }
    }

    fn native_plan(&self, language: Language, compiler: &str, ext: &str, run_id: RunId) -> RunPlan {
        let base = self.temp_dir.join(format!("code-{run_id}"));
        let source = base.with_extension(ext);
        let binary = base.with_extension("out");

        RunPlan {
            language,
            compile: Some(CommandSpec::new(
                compiler,
                [source.as_os_str(), OsStr::new("-o"), binary.as_os_str()],
            )),
            run: CommandSpec::new(&binary, Vec::<&str>::new()),
            resources: vec![source.clone(), binary],
            source_path: source,
            transform: SourceTransform::Verbatim,
        }
    }

    fn java_plan(&self, run_id: RunId) -> RunPlan {
        let class_name = format!("Main{}", run_id.simple());
        let source = self.temp_dir.join(format!("{class_name}.java"));
        let class_file = self.temp_dir.join(format!("{class_name}.class"));

        RunPlan {
            language: Language::Java,
            compile: Some(CommandSpec::new(&self.toolchain.javac, [source.as_os_str()])),
            run: CommandSpec::new(
                &self.toolchain.java,
                [
                    OsStr::new("-cp"),
                    self.temp_dir.as_os_str(),
                    OsStr::new(&class_name),
                ],
            ),
            resources: vec![source.clone(), class_file],
            source_path: source,
            transform: SourceTransform::RenamePublicClass(class_name),
        }
    }

    fn javascript_plan(&self, run_id: RunId) -> RunPlan {
        let source = self.temp_dir.join(format!("code-{run_id}.js"));

        RunPlan {
            language: Language::JavaScript,
            compile: None,
            run: CommandSpec::new(&self.toolchain.node, [source.as_os_str()]),
            resources: vec![source.clone()],
            source_path: source,
            transform: SourceTransform::Verbatim,
        }
    }
}

impl LanguageRunner for ToolchainRunner {
    fn plan(&self, language: &str, run_id: RunId) -> Result<RunPlan> {
        let plan = match language.parse::<Language>()? {
            Language::C => self.native_plan(Language::C, &self.toolchain.c_compiler, "c", run_id),
            Language::Cpp => {
                self.native_plan(Language::Cpp, &self.toolchain.cpp_compiler, "cpp", run_id)
            }
            Language::Java => self.java_plan(run_id),
            Language::JavaScript => self.javascript_plan(run_id),
        };
        Ok(plan)
    }
}

#[allow(clippy::unwrap_used)] // Literal pattern, covered by tests.
fn public_class_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"public\s+class\s+\w+").unwrap())
}

/// Rename the first `public class` declaration in `code` to `name`.
///
/// Code without a public class is returned unchanged; `javac` then reports
/// the mismatch itself.
pub(crate) fn rename_public_class(code: &str, name: &str) -> String {
    public_class_pattern()
        .replace(code, format!("public class {name}").as_str())
        .into_owned()
}
