//! Gradle build file analysis
//!
//! Two passes over every `.gradle` / `.gradle.kts` script:
//!
//! 1. Dependency declarations (`implementation`, `api`, `releaseCompile`,
//!    `<flavor>Implementation`, ...) are matched against the compiled
//!    dependency signatures.
//! 2. With full-line and block comments stripped, every declared Maven
//!    repository URL must match the list of trusted repositories.

use crate::rules::CompiledRuleSet;
use crate::{GateError, GateResult};
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};

const COMPILE_COMMANDS: &[&str] = &[
    "compile",
    "provided",
    "apk",
    "implementation",
    "classpath",
    "api",
    "compileOnly",
    "runtimeOnly",
];

const BUILD_TYPES: &[&str] = &["", "release"];

/// Repositories known to serve only free software, with the scheme
const ALLOWED_REPOS: &[(&str, &str)] = &[
    ("https://", "repo1.maven.org/maven2"), // mavenCentral()
    ("https://", "jcenter.bintray.com"),    // jcenter()
    ("https://", "jitpack.io"),
    ("https://", "www.jitpack.io"),
    ("https://", "repo.maven.apache.org/maven2"),
    ("https://", "oss.jfrog.org/artifactory/oss-snapshot-local"),
    ("https://", "oss.sonatype.org/content/repositories/snapshots"),
    ("https://", "oss.sonatype.org/content/repositories/releases"),
    ("https://", "oss.sonatype.org/content/groups/public"),
    ("https://", "clojars.org/repo"),
    ("https://", "repo.clojars.org"),
    ("https://", "s3.amazonaws.com/repo.commonsware.com"),
    ("https://", "plugins.gradle.org/m2"),
    ("https://", "maven.google.com"),
    ("file://", "/usr/share/maven-repo"), // Debian local repo
];

static ALLOWED_REPO_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ALLOWED_REPOS
        .iter()
        .map(|(scheme, repo)| {
            Regex::new(&format!("^{}{}/*", regex::escape(scheme), regex::escape(repo)))
                .expect("valid repository regex")
        })
        .collect()
});

static LINE_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ ]*//").expect("valid line comment regex"));

static BLOCK_COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid block comment regex"));

/// `maven { url "X" }`, `maven { url = uri("X") }`, `maven { setUrl("X") }`,
/// `maven(url = "X")`, `maven("X")` and friends; group 1 is the URL
static MAVEN_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?s)\smaven\s*(?:\{.*?(?:setUrl|url)|\((?:url)?)\s*=?\s*(?:uri)?\(?\s*["']?([^\s"']+)["']?[^})]*[)}]"#,
    )
    .expect("valid maven url regex")
});

/// A problem found in one build script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradleFinding {
    /// A dependency line matched a signature pattern
    Suspect(String),
    /// A repository URL outside the trusted list
    UnknownRepo(String),
}

impl GradleFinding {
    pub fn describe(&self) -> String {
        match self {
            Self::Suspect(pattern) => format!("usual suspect '{}'", pattern),
            Self::UnknownRepo(url) => format!("unknown maven repo '{}'", url),
        }
    }
}

pub struct GradleAnalyzer<'a> {
    rules: &'a CompiledRuleSet,
    compile_commands: Vec<Regex>,
}

impl<'a> GradleAnalyzer<'a> {
    /// `flavors` are the build's gradle flavors; `["yes"]` means none
    pub fn new(rules: &'a CompiledRuleSet, flavors: &[String]) -> GateResult<Self> {
        Ok(Self {
            rules,
            compile_commands: compile_commands(flavors)?,
        })
    }

    /// Whether `line` declares a dependency
    pub fn is_dependency_line(&self, line: &str) -> bool {
        self.compile_commands.iter().any(|re| re.is_match(line))
    }

    pub fn analyze(&self, content: &str) -> Vec<GradleFinding> {
        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let mut findings = Vec::new();

        for line in &lines {
            if self.is_dependency_line(line) {
                findings.extend(
                    self.rules
                        .dependency_suspects(line)
                        .into_iter()
                        .map(|p| GradleFinding::Suspect(p.to_string())),
                );
            }
        }

        findings.extend(
            unknown_repositories(&lines)
                .into_iter()
                .map(GradleFinding::UnknownRepo),
        );
        findings
    }
}

/// Flavor x build type x command, matched at line start ignoring case
fn compile_commands(flavors: &[String]) -> GateResult<Vec<Regex>> {
    let mut prefixes = vec![String::new()];
    if !(flavors.len() == 1 && flavors[0] == "yes") {
        prefixes.extend(flavors.iter().cloned());
    }

    let mut commands = Vec::new();
    for flavor in &prefixes {
        for build_type in BUILD_TYPES {
            for command in COMPILE_COMMANDS {
                let keyword = format!("{}{}{}", flavor, build_type, command);
                let re = RegexBuilder::new(&format!(r"^\s*{}", regex::escape(&keyword)))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| GateError::Pattern(format!("{}: {}", keyword, e)))?;
                commands.push(re);
            }
        }
    }
    Ok(commands)
}

/// Maven repository URLs declared outside comments
pub fn maven_repositories(lines: &[&str]) -> Vec<String> {
    let code: String = lines
        .iter()
        .filter(|line| !LINE_COMMENT.is_match(line))
        .copied()
        .collect();
    let code = BLOCK_COMMENT.replace_all(&code, "");

    MAVEN_URL
        .captures_iter(&code)
        .map(|cap| cap[1].to_string())
        .collect()
}

pub fn is_allowed_repository(url: &str) -> bool {
    ALLOWED_REPO_PATTERNS.iter().any(|re| re.is_match(url))
}

fn unknown_repositories(lines: &[&str]) -> Vec<String> {
    maven_repositories(lines)
        .into_iter()
        .filter(|url| !is_allowed_repository(url))
        .collect()
}
