//! Workflow settings (`wm.yaml`) and the explicit tier merge.
//!
//! Each tier deserializes into a [`WmConfigLayer`] whose fields are all
//! optional. Layers are applied field by field onto the fully populated
//! built-in [`WmConfig`]:
//!
//! - scalar keys: the higher tier replaces the lower one when present.
//! - `reviews` and `project`: shallow merge of their own fields.
//! - array-valued fields (`project.test_file_pattern`): replaced wholesale.

use serde::{Deserialize, Deserializer, Serialize};

/// Effective workflow settings after tier resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WmConfig {
    /// Where planning-mode specs are written, relative to the project root.
    pub spec_path: String,

    /// Where research-mode findings are written, relative to the project root.
    pub research_path: String,

    /// Session state untouched for longer than this is removed by `wm prune`.
    /// Zero keeps everything.
    pub session_retention_days: u32,

    pub reviews: ReviewsConfig,

    /// Shell command `wm verify` runs to produce verification evidence.
    /// Setting it also makes evidence a stop requirement in implementation modes.
    #[serde(default)]
    pub verify_command: Option<String>,

    pub project: ProjectConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewsConfig {
    /// Ask for a review of planning-mode specs before implementation.
    pub spec_review: bool,

    /// Tri-state: only an explicit `false` disables verification.
    #[serde(default)]
    pub code_review: Option<bool>,

    /// Reviewer that produces verification evidence (e.g. `codex`).
    #[serde(default)]
    pub code_reviewer: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// The project's own test command, suggested when new tests are missing.
    #[serde(default)]
    pub test_command: Option<String>,

    /// Branch the new-test heuristic diffs against (via its merge base).
    pub diff_base: String,

    /// Globs marking test files; empty turns the new-test heuristic off.
    /// Accepts a single string or a list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub test_file_pattern: Vec<String>,
}

impl WmConfig {
    /// Apply one higher-precedence tier on top of `self`.
    pub fn apply(&mut self, layer: &WmConfigLayer) {
        if let Some(spec_path) = &layer.spec_path {
            self.spec_path = spec_path.clone();
        }
        if let Some(research_path) = &layer.research_path {
            self.research_path = research_path.clone();
        }
        if let Some(days) = layer.session_retention_days {
            self.session_retention_days = days;
        }
        if let Some(command) = &layer.verify_command {
            self.verify_command = Some(command.clone());
        }
        if let Some(reviews) = &layer.reviews {
            if let Some(spec_review) = reviews.spec_review {
                self.reviews.spec_review = spec_review;
            }
            if let Some(code_review) = reviews.code_review {
                self.reviews.code_review = Some(code_review);
            }
            if let Some(reviewer) = &reviews.code_reviewer {
                self.reviews.code_reviewer = Some(reviewer.clone());
            }
        }
        if let Some(project) = &layer.project {
            if let Some(test_command) = &project.test_command {
                self.project.test_command = Some(test_command.clone());
            }
            if let Some(diff_base) = &project.diff_base {
                self.project.diff_base = diff_base.clone();
            }
            if let Some(patterns) = &project.test_file_pattern {
                self.project.test_file_pattern = patterns.0.clone();
            }
        }
    }

    /// Merge tiers lowest-first onto `base`.
    pub fn merged(mut self, layers: &[WmConfigLayer]) -> Self {
        for layer in layers {
            self.apply(layer);
        }
        self
    }

    /// A reviewer or a verify command exists to produce evidence.
    pub fn verification_configured(&self) -> bool {
        non_blank(self.reviews.code_reviewer.as_deref())
            || non_blank(self.verify_command.as_deref())
    }

    /// Verification is configured and not switched off with `code_review: false`.
    pub fn verification_required(&self) -> bool {
        self.verification_configured() && self.reviews.code_review != Some(false)
    }
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// One user- or project-level `wm.yaml`, every field optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WmConfigLayer {
    pub spec_path: Option<String>,
    pub research_path: Option<String>,
    pub session_retention_days: Option<u32>,
    pub reviews: Option<ReviewsLayer>,
    pub verify_command: Option<String>,
    pub project: Option<ProjectLayer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReviewsLayer {
    pub spec_review: Option<bool>,
    pub code_review: Option<bool>,
    pub code_reviewer: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProjectLayer {
    pub test_command: Option<String>,
    pub diff_base: Option<String>,
    pub test_file_pattern: Option<PatternList>,
}

/// Glob list that also accepts a single string in YAML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatternList(pub Vec<String>);

impl<'de> Deserialize<'de> for PatternList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        one_or_many(deserializer).map(PatternList)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(single)) => single
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Some(OneOrMany::Many(many)) => many,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> WmConfig {
        WmConfig {
            spec_path: "planning/specs".to_string(),
            research_path: "planning/research".to_string(),
            session_retention_days: 7,
            reviews: ReviewsConfig {
                spec_review: false,
                code_review: None,
                code_reviewer: None,
            },
            verify_command: None,
            project: ProjectConfig {
                test_command: None,
                diff_base: "main".to_string(),
                test_file_pattern: Vec::new(),
            },
        }
    }

    fn layer(yaml: &str) -> WmConfigLayer {
        serde_yaml::from_str(yaml).expect("layer yaml")
    }

    #[test]
    fn reviewer_only_keeps_sibling_defaults() {
        let project = layer("reviews:\n  code_reviewer: codex\n");
        let merged = base().merged(&[project]);
        assert_eq!(merged.reviews.code_reviewer.as_deref(), Some("codex"));
        assert!(!merged.reviews.spec_review);
        assert_eq!(merged.reviews.code_review, None);
    }

    #[test]
    fn project_wins_on_overlapping_scalars() {
        let user = layer("spec_path: user/specs\nsession_retention_days: 30\n");
        let project = layer("spec_path: project/specs\n");
        let merged = base().merged(&[user, project]);
        assert_eq!(merged.spec_path, "project/specs");
        assert_eq!(merged.session_retention_days, 30);
    }

    #[test]
    fn disjoint_tiers_commute() {
        let user = layer("research_path: r\nproject:\n  diff_base: develop\n");
        let project = layer("verify_command: make check\nreviews:\n  spec_review: true\n");
        let a = base().merged(&[user.clone(), project.clone()]);
        let b = base().merged(&[project, user]);
        assert_eq!(a, b);
    }

    #[test]
    fn nested_objects_merge_shallowly_across_tiers() {
        let user = layer("project:\n  test_command: cargo test\n  diff_base: develop\n");
        let project = layer("project:\n  diff_base: trunk\n");
        let merged = base().merged(&[user, project]);
        assert_eq!(merged.project.test_command.as_deref(), Some("cargo test"));
        assert_eq!(merged.project.diff_base, "trunk");
    }

    #[test]
    fn pattern_arrays_replace_instead_of_concatenating() {
        let user = layer("project:\n  test_file_pattern: ['**/*_test.go', 'tests/**']\n");
        let project = layer("project:\n  test_file_pattern: '**/*.spec.ts'\n");
        let merged = base().merged(&[user, project]);
        assert_eq!(merged.project.test_file_pattern, vec!["**/*.spec.ts"]);
    }

    #[test]
    fn verification_requirement_honours_explicit_disable() {
        let mut cfg = base();
        assert!(!cfg.verification_required());
        cfg.verify_command = Some("just verify".to_string());
        assert!(cfg.verification_required());
        cfg.reviews.code_review = Some(false);
        assert!(!cfg.verification_required());
        cfg.reviews.code_review = Some(true);
        cfg.verify_command = Some("   ".to_string());
        assert!(!cfg.verification_required());
    }
}
