//! Static lookup tables mapping galaxy metadata to display shapes
//!
//! Both tables are finite and closed; a miss is answered with a default
//! rather than an error so unknown categories still render.

use serde::Serialize;

/// Output entity category for a cluster, selected by its galaxy type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum OutputKind {
    AttackTechnique,
    CourseOfAction,
    Sector,
    Software,
    ThreatActor,
    Vulnerability,
    /// Fallback for categories without a dedicated shape
    #[default]
    Galaxy,
}

impl OutputKind {
    /// Entity type name understood by graph consumers
    pub fn entity_name(&self) -> &'static str {
        match self {
            OutputKind::AttackTechnique => "AttackTechnique",
            OutputKind::CourseOfAction => "CourseOfAction",
            OutputKind::Sector => "Sector",
            OutputKind::Software => "Software",
            OutputKind::ThreatActor => "ThreatActor",
            OutputKind::Vulnerability => "Vulnerability",
            OutputKind::Galaxy => "MISPGalaxy",
        }
    }
}

/// Select the output entity category for a galaxy type
pub fn output_kind(galaxy_type: &str) -> OutputKind {
    match galaxy_type {
        "threat-actor" | "microsoft-activity-group" => OutputKind::ThreatActor,
        "mitre-attack-pattern"
        | "mitre-enterprise-attack-attack-pattern"
        | "mitre-mobile-attack-attack-pattern"
        | "mitre-pre-attack-attack-pattern" => OutputKind::AttackTechnique,
        "mitre-course-of-action" | "mitre-enterprise-attack-course-of-action" => {
            OutputKind::CourseOfAction
        }
        "android" | "backdoor" | "botnet" | "exploit-kit" | "malpedia" | "mitre-malware"
        | "mitre-tool" | "ransomware" | "rat" | "stealer" | "tool" => OutputKind::Software,
        "branded-vulnerability" => OutputKind::Vulnerability,
        "sector" => OutputKind::Sector,
        _ => OutputKind::Galaxy,
    }
}

const ICON_BASE: &str = "https://raw.githubusercontent.com/MISP/intelligence-icons/main/flat/";

/// Resolve a galaxy descriptor icon name to a display icon URL
///
/// Icon names are the font-awesome identifiers carried by the upstream galaxy
/// descriptors; unknown names keep the consumer's default icon.
pub fn icon_url(icon: &str) -> Option<String> {
    let file = match icon {
        "android" => "android.svg",
        "btc" | "usd" => "money.svg",
        "bug" => "vulnerability.svg",
        "eye" => "spyware.svg",
        "gavel" => "legal.svg",
        "internet-explorer" => "exploit_kit.svg",
        "industry" => "sector.svg",
        "lock" => "ransomware.svg",
        "map" => "campaign.svg",
        "optin-monster" => "malware.svg",
        "shield" => "course_of_action.svg",
        "sitemap" => "botnet.svg",
        "user-secret" => "threat_actor.svg",
        "wrench" => "tool.svg",
        _ => return None,
    };
    Some(format!("{}{}", ICON_BASE, file))
}
