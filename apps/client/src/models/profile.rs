use serde::{Deserialize, Serialize};

/// The user's job-search profile as reported by `GET /profile/`.
///
/// Field names follow the backend schema; the preference fields double as
/// the profile-strength checklist consumed by the dashboard aggregator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    /// Desired job title ("query" in the matching engine's terms).
    pub query: Option<String>,
    pub location: Option<String>,
    pub mode_of_job: Option<String>,
    pub work_experience: Option<String>,
    #[serde(default)]
    pub employment_types: Vec<String>,
    #[serde(default)]
    pub company_types: Vec<String>,
    pub job_requirements: Option<String>,
    /// Whether a resume has been uploaded and successfully parsed.
    #[serde(default)]
    pub has_resume: bool,
    #[serde(default)]
    pub preferences_set: bool,
}

impl Profile {
    fn present(value: &Option<String>) -> bool {
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    /// Profile strength as a percentage.
    ///
    /// A fixed checklist of eight equally weighted items: title, location,
    /// work mode, experience, employment types, company types, parsed
    /// resume, and extra requirements.
    pub fn strength_pct(&self) -> u8 {
        let checklist = [
            Self::present(&self.query),
            Self::present(&self.location),
            Self::present(&self.mode_of_job),
            Self::present(&self.work_experience),
            !self.employment_types.is_empty(),
            !self.company_types.is_empty(),
            self.has_resume,
            Self::present(&self.job_requirements),
        ];
        let filled = checklist.iter().filter(|&&c| c).count() as u32;
        ((filled * 100) / checklist.len() as u32) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_profile_has_zero_strength() {
        assert_eq!(Profile::default().strength_pct(), 0);
    }

    #[test]
    fn test_each_item_carries_equal_weight() {
        let mut profile = Profile {
            query: Some("Software Engineer".into()),
            location: Some("Berlin".into()),
            mode_of_job: Some("remote".into()),
            work_experience: Some("3 years".into()),
            ..Profile::default()
        };
        assert_eq!(profile.strength_pct(), 50);

        profile.employment_types = vec!["FULLTIME".into()];
        profile.company_types = vec!["startup".into()];
        profile.has_resume = true;
        profile.job_requirements = Some("visa sponsorship".into());
        assert_eq!(profile.strength_pct(), 100);
    }

    #[test]
    fn test_whitespace_only_fields_do_not_count() {
        let profile = Profile {
            query: Some("   ".into()),
            ..Profile::default()
        };
        assert_eq!(profile.strength_pct(), 0);
    }
}
