// Report generation from the recorded graph

use crate::model::{GraphPayload, ScanCounts, ScanData};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportFormat {
    Text,
    Json,
    Csv,
    Markdown,
}

impl ReportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(ReportFormat::Text),
            "json" => Some(ReportFormat::Json),
            "csv" => Some(ReportFormat::Csv),
            "markdown" | "md" => Some(ReportFormat::Markdown),
            _ => None,
        }
    }
}

/// One page with the pages it links to, in report order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSummary {
    pub url: String,
    pub name: String,
    pub first_seen: i64,
    pub outbound: Vec<String>,
    pub inbound: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportData {
    pub counts: ScanCounts,
    pub dangling_links: usize,
    pub pages: Vec<PageSummary>,
    pub graph: GraphPayload,
}

pub fn gather_report_data(data: &ScanData) -> ReportData {
    let graph = data.snapshot();

    let mut outbound: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut inbound: BTreeMap<&str, usize> = BTreeMap::new();
    for link in &graph.links {
        outbound
            .entry(link.source.as_str())
            .or_default()
            .push(link.target_name.clone());
        *inbound.entry(link.target.as_str()).or_default() += 1;
    }

    let pages = data
        .pages
        .values()
        .map(|page| PageSummary {
            url: page.href.clone(),
            name: page.name.clone(),
            first_seen: page.timestamp,
            outbound: outbound.get(page.href.as_str()).cloned().unwrap_or_default(),
            inbound: inbound.get(page.href.as_str()).copied().unwrap_or(0),
        })
        .collect();

    ReportData {
        counts: data.counts(),
        dangling_links: data.links.len() - graph.links.len(),
        pages,
        graph,
    }
}

pub fn generate_report(
    data: &ScanData,
    format: ReportFormat,
) -> Result<String, serde_json::Error> {
    let report = gather_report_data(data);
    match format {
        ReportFormat::Text => Ok(generate_text_report(&report)),
        ReportFormat::Json => generate_json_report(&report),
        ReportFormat::Csv => Ok(generate_csv_report(&report)),
        ReportFormat::Markdown => Ok(generate_markdown_report(&report)),
    }
}

pub fn generate_text_report(data: &ReportData) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push('\n');
    report.push_str("                        NEXUS WORKSPACE GRAPH REPORT\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    report.push_str(&format!("Pages:          {}\n", data.counts.pages));
    report.push_str(&format!("Links:          {}\n", data.counts.links));
    if data.dangling_links > 0 {
        report.push_str(&format!("Dangling links: {}\n", data.dangling_links));
    }
    report.push('\n');

    if data.pages.is_empty() {
        report.push_str("  (empty)\n");
        return report;
    }

    report.push_str(RULE);
    report.push_str("\nPAGES\n");
    report.push_str(RULE);
    report.push_str("\n\n");

    for page in &data.pages {
        report.push_str(&format!(
            "{}  [{} in / {} out]\n",
            page.name,
            page.inbound,
            page.outbound.len()
        ));
        report.push_str(&format!("  {}\n", page.url));
        for (i, target) in page.outbound.iter().enumerate() {
            let prefix = if i == page.outbound.len() - 1 {
                "└── "
            } else {
                "├── "
            };
            report.push_str(&format!("  {}{}\n", prefix, target));
        }
        report.push('\n');
    }

    report
}

pub fn generate_json_report(data: &ReportData) -> Result<String, serde_json::Error> {
    let json_report = serde_json::json!({
        "report": {
            "metadata": {
                "generator": "Nexus",
                "version": env!("CARGO_PKG_VERSION"),
                "generated_at": chrono::Utc::now().to_rfc3339(),
                "format": "json"
            },
            "summary": {
                "total_pages": data.counts.pages,
                "total_links": data.counts.links,
                "dangling_links": data.dangling_links
            },
            "graph": data.graph
        }
    });

    serde_json::to_string_pretty(&json_report)
}

pub fn generate_csv_report(data: &ReportData) -> String {
    let mut report = String::from("source,target,source_name,target_name\n");
    for link in &data.graph.links {
        report.push_str(&format!(
            "{},{},{},{}\n",
            csv_field(&link.source),
            csv_field(&link.target),
            csv_field(&link.source_name),
            csv_field(&link.target_name)
        ));
    }
    report
}

pub fn generate_markdown_report(data: &ReportData) -> String {
    let mut report = String::from("# Nexus Workspace Graph\n\n");
    report.push_str(&format!(
        "**{}** pages, **{}** links\n\n",
        data.counts.pages, data.counts.links
    ));

    report.push_str("| Page | Inbound | Outbound |\n|---|---|---|\n");
    for page in &data.pages {
        report.push_str(&format!(
            "| [{}]({}) | {} | {} |\n",
            page.name.replace('|', "\\|"),
            page.url,
            page.inbound,
            page.outbound.len()
        ));
    }
    report
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
