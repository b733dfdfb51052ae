// 🏷️ Tag vocabularies - the closed sets profiles are filtered on
//
// Every tag has a stable storage value (what goes in SQLite and JSON)
// and a human label (what a listing page would show).

use thiserror::Error;

/// A string that is not part of a tag vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownTag {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a closed tag vocabulary.
///
/// Variant order is the ordinal order (`Ord`), so ladders such as
/// `VerificationTier` must be declared lowest first.
macro_rules! tag_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => ($value:literal, $label:literal) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $value)] $variant, )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Storage value (snake_case)
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }

            /// Display label
            pub fn label(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::entities::tags::UnknownTag;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|tag| tag.as_str().eq_ignore_ascii_case(needle))
                    .ok_or_else(|| $crate::entities::tags::UnknownTag {
                        kind: stringify!($name),
                        value: s.to_string(),
                    })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

pub(crate) use tag_enum;

// ============================================================================
// PROFILE TAGS
// ============================================================================

tag_enum! {
    /// Ordinal trust ladder shown as a badge on every profile
    VerificationTier {
        Listed => ("listed", "Listed"),
        Verified => ("verified", "Verified"),
        Certified => ("certified", "Certified"),
    }
}

impl Default for VerificationTier {
    fn default() -> Self {
        VerificationTier::Listed
    }
}

tag_enum! {
    Availability {
        Accepting => ("accepting", "Accepting New Clients"),
        Waitlist => ("waitlist", "Waitlist Only"),
        NotAccepting => ("not_accepting", "Not Accepting"),
    }
}

impl Default for Availability {
    fn default() -> Self {
        Availability::Accepting
    }
}

tag_enum! {
    PractitionerRole {
        Psychiatrist => ("psychiatrist", "Psychiatrist"),
        Psychologist => ("psychologist", "Psychologist"),
        Therapist => ("therapist", "Therapist / Counselor"),
        Nurse => ("nurse", "Nurse Practitioner"),
        IntegrationCoach => ("integration_coach", "Integration Coach"),
    }
}

tag_enum! {
    /// Substance a practitioner or clinic works with
    Modality {
        Mdma => ("mdma", "MDMA"),
        Psilocybin => ("psilocybin", "Psilocybin"),
        Ketamine => ("ketamine", "Ketamine"),
        Lsd => ("lsd", "LSD"),
        Cannabis => ("cannabis", "Cannabis"),
        Ayahuasca => ("ayahuasca", "Ayahuasca"),
        Ibogaine => ("ibogaine", "Ibogaine"),
        FiveMeoDmt => ("5-meo-dmt", "5-MeO-DMT"),
    }
}

tag_enum! {
    Specialty {
        Trauma => ("trauma", "Trauma & PTSD"),
        Ptsd => ("ptsd", "PTSD"),
        Depression => ("depression", "Depression"),
        Anxiety => ("anxiety", "Anxiety"),
        Addiction => ("addiction", "Addiction & Recovery"),
        EndOfLife => ("end_of_life", "End-of-Life"),
        Couples => ("couples", "Couples & Relationships"),
        Spiritual => ("spiritual", "Spiritual Exploration"),
        EatingDisorders => ("eating_disorders", "Eating Disorders"),
        Ocd => ("ocd", "OCD"),
        ChronicPain => ("chronic_pain", "Chronic Pain"),
    }
}

tag_enum! {
    ServiceType {
        Dosing => ("dosing", "Dosing Sessions"),
        Integration => ("integration", "Integration Therapy"),
    }
}

tag_enum! {
    /// Public or private cover a practitioner bills against
    CoverageType {
        Medicare => ("medicare", "Medicare"),
        Dva => ("dva", "DVA"),
        Phi => ("phi", "Private Health"),
    }
}

// ============================================================================
// CLINIC TAGS
// ============================================================================

tag_enum! {
    ClinicTreatmentType {
        Individual => ("individual", "Individual Therapy"),
        Group => ("group", "Group Sessions"),
        Couples => ("couples", "Couples Therapy"),
        Family => ("family", "Family Therapy"),
        Retreat => ("retreat", "Retreat Programs"),
    }
}

tag_enum! {
    InsuranceType {
        Medicare => ("medicare", "Medicare"),
        Dva => ("dva", "DVA"),
        PrivateHealth => ("private_health", "Private Health Insurance"),
        Ndis => ("ndis", "NDIS"),
        WorkersComp => ("workers_comp", "Workers' Compensation"),
    }
}

/// Parse a separator-delimited tag list (`"mdma|ketamine"`).
///
/// Blank items are skipped and duplicates collapse to the first occurrence.
pub fn parse_tag_list<T>(raw: &str, separator: char) -> Result<Vec<T>, UnknownTag>
where
    T: std::str::FromStr<Err = UnknownTag> + PartialEq,
{
    let mut tags = Vec::new();

    for item in raw.split(separator) {
        if item.trim().is_empty() {
            continue;
        }
        let tag: T = item.parse()?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    Ok(tags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ladder_ordering() {
        assert!(VerificationTier::Listed < VerificationTier::Verified);
        assert!(VerificationTier::Verified < VerificationTier::Certified);
        assert_eq!(
            VerificationTier::Listed.max(VerificationTier::Certified),
            VerificationTier::Certified
        );
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("MDMA".parse::<Modality>().unwrap(), Modality::Mdma);
        assert_eq!(" 5-meo-dmt ".parse::<Modality>().unwrap(), Modality::FiveMeoDmt);
        assert_eq!(
            "integration_coach".parse::<PractitionerRole>().unwrap(),
            PractitionerRole::IntegrationCoach
        );
    }

    #[test]
    fn test_unknown_tag_reports_kind() {
        let err = "peyote".parse::<Modality>().unwrap_err();
        assert_eq!(err.kind, "Modality");
        assert_eq!(err.to_string(), "unknown Modality 'peyote'");
    }

    #[test]
    fn test_serde_uses_storage_value() {
        let json = serde_json::to_string(&Modality::FiveMeoDmt).unwrap();
        assert_eq!(json, "\"5-meo-dmt\"");

        let tier: VerificationTier = serde_json::from_str("\"certified\"").unwrap();
        assert_eq!(tier, VerificationTier::Certified);
    }

    #[test]
    fn test_parse_tag_list_dedupes_and_skips_blanks() {
        let tags: Vec<Specialty> = parse_tag_list("trauma||ptsd|trauma| ", '|').unwrap();
        assert_eq!(tags, vec![Specialty::Trauma, Specialty::Ptsd]);

        let err = parse_tag_list::<Specialty>("trauma|grief", '|').unwrap_err();
        assert_eq!(err.value, "grief");
    }

    #[test]
    fn test_labels() {
        assert_eq!(InsuranceType::WorkersComp.label(), "Workers' Compensation");
        assert_eq!(Availability::NotAccepting.label(), "Not Accepting");
        assert_eq!(CoverageType::ALL.len(), 3);
    }
}
