//! Project report sections and plain-text export

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

/// Icons a report section may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportIcon {
    FileText,
    FolderTree,
    Users,
    Library,
    AlertTriangle,
    LineChart,
    BarChart,
    PieChart,
    ListTree,
    User,
    Group,
    AlertCircle,
    Home,
}

impl ReportIcon {
    pub const ALL: [ReportIcon; 13] = [
        ReportIcon::FileText,
        ReportIcon::FolderTree,
        ReportIcon::Users,
        ReportIcon::Library,
        ReportIcon::AlertTriangle,
        ReportIcon::LineChart,
        ReportIcon::BarChart,
        ReportIcon::PieChart,
        ReportIcon::ListTree,
        ReportIcon::User,
        ReportIcon::Group,
        ReportIcon::AlertCircle,
        ReportIcon::Home,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReportIcon::FileText => "FileText",
            ReportIcon::FolderTree => "FolderTree",
            ReportIcon::Users => "Users",
            ReportIcon::Library => "Library",
            ReportIcon::AlertTriangle => "AlertTriangle",
            ReportIcon::LineChart => "LineChart",
            ReportIcon::BarChart => "BarChart",
            ReportIcon::PieChart => "PieChart",
            ReportIcon::ListTree => "ListTree",
            ReportIcon::User => "User",
            ReportIcon::Group => "Group",
            ReportIcon::AlertCircle => "AlertCircle",
            ReportIcon::Home => "Home",
        }
    }

    /// Case-insensitive lookup by name
    pub fn from_name(name: &str) -> Option<Self> {
        ReportIcon::ALL
            .into_iter()
            .find(|icon| icon.name().eq_ignore_ascii_case(name.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub title: String,
    pub content: String,
    /// Unknown icon names are dropped rather than rejected
    #[serde(
        default,
        deserialize_with = "lenient_icon",
        skip_serializing_if = "Option::is_none"
    )]
    pub icon: Option<ReportIcon>,
}

fn lenient_icon<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ReportIcon>, D::Error> {
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(ReportIcon::from_name))
}

/// Render sections as `## title` blocks separated by `---` rules
pub fn render_report_text(sections: &[ReportSection]) -> String {
    sections
        .iter()
        .map(|s| format!("## {}\n\n{}\n\n", s.title, s.content))
        .collect::<Vec<_>>()
        .join("---\n\n")
}

/// Download name for a report exported on `date`
pub fn report_file_name(date: NaiveDate) -> String {
    format!("project-report-{}.txt", date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(title: &str, content: &str) -> ReportSection {
        ReportSection {
            title: title.to_string(),
            content: content.to_string(),
            icon: None,
        }
    }

    #[test]
    fn test_render_text() {
        let text = render_report_text(&[section("Summary", "All good."), section("Risks", "None.")]);
        assert_eq!(text, "## Summary\n\nAll good.\n\n---\n\n## Risks\n\nNone.\n\n");
        assert_eq!(render_report_text(&[]), "");
    }

    #[test]
    fn test_file_name() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 7).unwrap();
        assert_eq!(report_file_name(date), "project-report-2024-05-07.txt");
    }

    #[test]
    fn test_unknown_icons_are_dropped() {
        let sections: Vec<ReportSection> = serde_json::from_value(json!([
            {"title": "A", "content": "a", "icon": "Users"},
            {"title": "B", "content": "b", "icon": "Sparkles"},
            {"title": "C", "content": "c"},
            {"title": "D", "content": "d", "icon": "alerttriangle"},
        ]))
        .unwrap();

        assert_eq!(sections[0].icon, Some(ReportIcon::Users));
        assert_eq!(sections[1].icon, None);
        assert_eq!(sections[2].icon, None);
        assert_eq!(sections[3].icon, Some(ReportIcon::AlertTriangle));
    }
}
