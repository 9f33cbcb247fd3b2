//! Language runners: turn a language name into a concrete run plan.
//!
//! A [`LanguageRunner`] is a pure function of the language and the run id.
//! It decides where the source lives, how to compile it (if at all), how
//! to run it, and which files the run leaves behind. The orchestrator only
//! depends on this contract; [`ToolchainRunner`] is the built-in one.

mod toolchain;

use std::ffi::OsString;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use crate::models::ids::RunId;
use crate::{AppError, Result};

pub use toolchain::ToolchainRunner;

/// Languages the built-in runner knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    /// C, compiled with the configured C compiler.
    C,
    /// C++, compiled with the configured C++ compiler.
    Cpp,
    /// Java, compiled with `javac` and launched with `java`.
    Java,
    /// JavaScript, interpreted by Node.js.
    JavaScript,
}

impl Language {
    /// Canonical wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Java => "java",
            Self::JavaScript => "javascript",
        }
    }
}

impl FromStr for Language {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "c" => Ok(Self::C),
            "cpp" | "c++" => Ok(Self::Cpp),
            "java" => Ok(Self::Java),
            "javascript" | "js" | "node" => Ok(Self::JavaScript),
            _ => Err(AppError::UnsupportedLanguage(raw.to_owned())),
        }
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executable plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to execute (looked up on `PATH` when not a path).
    pub program: OsString,
    /// Arguments in order.
    pub args: Vec<OsString>,
}

impl CommandSpec {
    /// Build a command from a program and arguments.
    pub fn new<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<OsString>,
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl Display for CommandSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Rewrites applied to submitted source before it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTransform {
    /// Write the code unchanged.
    Verbatim,
    /// Rename the first `public class` to this name so it matches the file.
    RenamePublicClass(String),
}

/// Everything the orchestrator needs to execute one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Language the plan was built for.
    pub language: Language,
    /// Where the submitted source is written.
    pub source_path: PathBuf,
    /// Optional compile step; must succeed before `run` starts.
    pub compile: Option<CommandSpec>,
    /// The interactive program.
    pub run: CommandSpec,
    /// Every file the run may create, source first.
    pub resources: Vec<PathBuf>,
    /// Source rewrite applied by [`RunPlan::render_source`].
    pub transform: SourceTransform,
}

impl RunPlan {
    /// Apply the plan's source transform to `code`.
    #[must_use]
    pub fn render_source(&self, code: &str) -> String {
        match &self.transform {
            SourceTransform::Verbatim => code.to_owned(),
            SourceTransform::RenamePublicClass(name) => toolchain::rename_public_class(code, name),
        }
    }
}

/// Produces run plans for requested languages.
pub trait LanguageRunner: Send + Sync {
    /// Build the plan for `language` and `run_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::UnsupportedLanguage` when no plan exists for the
    /// language. Implementations must not touch the filesystem.
    fn plan(&self, language: &str, run_id: RunId) -> Result<RunPlan>;
}
