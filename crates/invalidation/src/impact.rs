use context_protocol::{normalize_path, Language};
use serde::{Deserialize, Serialize};

/// Manifests, lockfiles and build/lint configs: any change can alter every analysis
const CRITICAL_FILES: &[&str] = &[
    "package.json",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "pnpm-workspace.yaml",
    "cargo.toml",
    "cargo.lock",
    "pyproject.toml",
    "poetry.lock",
    "requirements.txt",
    "pipfile",
    "pipfile.lock",
    "setup.py",
    "setup.cfg",
    "go.mod",
    "go.sum",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "settings.gradle",
    "gemfile",
    "gemfile.lock",
    "makefile",
    "dockerfile",
    ".babelrc",
    ".eslintrc",
    ".prettierrc",
    ".editorconfig",
];

const CRITICAL_PREFIXES: &[&str] = &[
    "tsconfig.",
    "jsconfig.",
    "webpack.config.",
    "vite.config.",
    "rollup.config.",
    "babel.config.",
    "eslint.config.",
    ".eslintrc.",
    ".prettierrc.",
    "jest.config.",
    "vitest.config.",
    "next.config.",
    "tailwind.config.",
    "postcss.config.",
];

const SHARED_DIRS: &[&str] = &[
    "lib", "libs", "utils", "util", "shared", "common", "core", "types", "typings", "helpers",
];

const SHARED_FILES: &[&str] = &[
    "mod.rs",
    "lib.rs",
    "__init__.py",
    "types.ts",
    "types.py",
    "constants.ts",
    "constants.py",
];

/// Impact class of one changed path, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpactTier {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationStrategy {
    /// Clear the whole cache and every context
    Full,
    /// Changed files plus their transitive dependents
    Conservative,
    /// Changed files plus their direct dependents
    Balanced,
    /// Only contexts that contain the changed file itself
    Deferred,
}

impl ImpactTier {
    pub fn strategy(self) -> InvalidationStrategy {
        match self {
            ImpactTier::Critical => InvalidationStrategy::Full,
            ImpactTier::High => InvalidationStrategy::Conservative,
            ImpactTier::Medium => InvalidationStrategy::Balanced,
            ImpactTier::Low => InvalidationStrategy::Deferred,
        }
    }

    /// 0 runs first
    pub fn priority(self) -> u8 {
        match self {
            ImpactTier::Critical => 0,
            ImpactTier::High => 1,
            ImpactTier::Medium => 2,
            ImpactTier::Low => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ImpactTier::Critical => "critical",
            ImpactTier::High => "high",
            ImpactTier::Medium => "medium",
            ImpactTier::Low => "low",
        }
    }
}

pub fn classify_path(path: &str) -> ImpactTier {
    let lowered = normalize_path(path).to_lowercase();
    let mut segments: Vec<&str> = lowered.split('/').filter(|s| !s.is_empty()).collect();
    let Some(file_name) = segments.pop() else {
        return ImpactTier::Low;
    };

    if CRITICAL_FILES.contains(&file_name)
        || CRITICAL_PREFIXES.iter().any(|p| file_name.starts_with(p))
    {
        return ImpactTier::Critical;
    }

    if !Language::from_path(file_name).is_source() {
        return ImpactTier::Low;
    }

    let shared_dir = segments.iter().any(|s| SHARED_DIRS.contains(s));
    let shared_file = SHARED_FILES.contains(&file_name)
        || file_name.starts_with("index.")
        || file_name.ends_with(".d.ts");
    if shared_dir || shared_file {
        ImpactTier::High
    } else {
        ImpactTier::Medium
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanGroup {
    pub tier: ImpactTier,
    pub strategy: InvalidationStrategy,
    pub priority: u8,
    pub paths: Vec<String>,
}

/// Changed paths of one batch grouped by tier, highest priority first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InvalidationPlan {
    groups: Vec<PlanGroup>,
}

impl InvalidationPlan {
    /// A critical path short-circuits: the plan becomes one full
    /// invalidation covering the whole batch.
    pub fn build<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut by_tier: Vec<(ImpactTier, Vec<String>)> = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let tier = classify_path(path);
            if tier == ImpactTier::Critical {
                log::info!("Critical change to {path}, planning full invalidation");
                return Self {
                    groups: vec![PlanGroup {
                        tier,
                        strategy: tier.strategy(),
                        priority: tier.priority(),
                        paths: paths.iter().map(|p| p.as_ref().to_string()).collect(),
                    }],
                };
            }
            match by_tier.iter_mut().find(|(t, _)| *t == tier) {
                Some((_, group)) => group.push(path.to_string()),
                None => by_tier.push((tier, vec![path.to_string()])),
            }
        }

        by_tier.sort_by_key(|(tier, _)| tier.priority());
        Self {
            groups: by_tier
                .into_iter()
                .map(|(tier, paths)| PlanGroup {
                    tier,
                    strategy: tier.strategy(),
                    priority: tier.priority(),
                    paths,
                })
                .collect(),
        }
    }

    pub fn groups(&self) -> &[PlanGroup] {
        &self.groups
    }

    pub fn is_full(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.strategy == InvalidationStrategy::Full)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn manifests_and_build_configs_are_critical() {
        for path in [
            "package.json",
            "frontend/package.json",
            "Cargo.toml",
            "tsconfig.build.json",
            "web/vite.config.ts",
            ".eslintrc.js",
            "requirements.txt",
        ] {
            assert_eq!(classify_path(path), ImpactTier::Critical, "{path}");
        }
    }

    #[test]
    fn shared_code_is_high() {
        for path in [
            "src/utils/format.ts",
            "src/lib/http.py",
            "src/index.ts",
            "types/api.d.ts",
            "pkg/__init__.py",
            "src/cache/mod.rs",
        ] {
            assert_eq!(classify_path(path), ImpactTier::High, "{path}");
        }
    }

    #[test]
    fn other_source_is_medium_and_the_rest_low() {
        assert_eq!(classify_path("src/auth/login.ts"), ImpactTier::Medium);
        assert_eq!(classify_path("app/models.py"), ImpactTier::Medium);
        assert_eq!(classify_path("docs/readme.md"), ImpactTier::Low);
        assert_eq!(classify_path("src/utils/notes.md"), ImpactTier::Low);
        assert_eq!(classify_path("assets/logo.png"), ImpactTier::Low);
    }

    #[test]
    fn plan_groups_by_priority() {
        let plan = InvalidationPlan::build(&["docs/a.md", "src/a.ts", "src/utils/x.ts", "src/b.ts"]);
        let tiers: Vec<ImpactTier> = plan.groups().iter().map(|g| g.tier).collect();
        assert_eq!(
            tiers,
            vec![ImpactTier::High, ImpactTier::Medium, ImpactTier::Low]
        );
        assert_eq!(plan.groups()[1].paths, vec!["src/a.ts", "src/b.ts"]);
        assert_eq!(plan.groups()[1].strategy, InvalidationStrategy::Balanced);
        assert!(!plan.is_full());
    }

    #[test]
    fn critical_path_short_circuits_the_batch() {
        let plan = InvalidationPlan::build(&["src/a.ts", "package.json", "docs/a.md"]);
        assert!(plan.is_full());
        assert_eq!(plan.groups().len(), 1);
        assert_eq!(
            plan.groups()[0].paths,
            vec!["src/a.ts", "package.json", "docs/a.md"]
        );
    }
}
