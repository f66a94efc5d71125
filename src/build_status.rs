use chrono::{DateTime, Utc};

/// Outcome of the builds attached to a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildStatus {
    #[default]
    Unknown,
    InProgress,
    Successful,
    Failed,
    /// The status could not be fetched.
    Error,
}

impl BuildStatus {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::InProgress => "in progress",
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    /// Folds the states of a commit's builds into the one the indicator shows.
    /// A single failure wins over anything running, and everything has to pass
    /// for the commit to count as successful.
    pub fn aggregate<'a>(states: impl IntoIterator<Item = &'a BuildStatus>) -> BuildStatus {
        let mut seen_any = false;
        let mut all_successful = true;
        let mut in_progress = false;
        for state in states {
            seen_any = true;
            match state {
                Self::Failed => return Self::Failed,
                Self::InProgress => in_progress = true,
                Self::Successful => {}
                Self::Unknown | Self::Error => all_successful = false,
            }
        }
        if in_progress {
            Self::InProgress
        } else if seen_any && all_successful {
            Self::Successful
        } else {
            Self::Unknown
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Build {
    pub key: String,
    pub name: String,
    pub state: BuildStatus,
    pub url: String,
    pub description: Option<String>,
    pub date_added: Option<DateTime<Utc>>,
}

/// Result of one fetch for the checked-out commit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BuildReport {
    pub status: BuildStatus,
    pub builds: Vec<Build>,
}

impl BuildReport {
    pub fn from_builds(builds: Vec<Build>) -> Self {
        let status = BuildStatus::aggregate(builds.iter().map(|b| &b.state));
        BuildReport { status, builds }
    }
}

#[cfg(test)]
mod build_status_tests {
    use super::*;

    #[test]
    fn failure_wins() {
        let states = [
            BuildStatus::Successful,
            BuildStatus::InProgress,
            BuildStatus::Failed,
        ];
        assert_eq!(BuildStatus::aggregate(&states), BuildStatus::Failed);
    }

    #[test]
    fn running_before_success() {
        let states = [BuildStatus::Successful, BuildStatus::InProgress];
        assert_eq!(BuildStatus::aggregate(&states), BuildStatus::InProgress);
    }

    #[test]
    fn all_successful() {
        let states = [BuildStatus::Successful, BuildStatus::Successful];
        assert_eq!(BuildStatus::aggregate(&states), BuildStatus::Successful);
    }

    #[test]
    fn empty_or_unrecognised_is_unknown() {
        assert_eq!(BuildStatus::aggregate(&[]), BuildStatus::Unknown);
        let states = [BuildStatus::Successful, BuildStatus::Unknown];
        assert_eq!(BuildStatus::aggregate(&states), BuildStatus::Unknown);
    }
}
