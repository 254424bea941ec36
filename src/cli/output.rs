use std::fmt::Write as FmtWrite;

use serde::Serialize;

use crate::models::{
    ImportSummary, OutputFormat, Project, SearchResults, Source, SourceStatus,
    WorkspaceImportSummary,
};
use crate::services::{IndexReport, WorkspaceStatus};
use crate::utils::preview;

const PREVIEW_CHARS: usize = 200;

pub trait Formatter {
    fn format_search_results(&self, results: &SearchResults) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_index_report(&self, report: &IndexReport) -> String;
    fn format_projects(&self, projects: &[Project]) -> String;
    fn format_sources(&self, sources: &[Source]) -> String;
    fn format_import_summary(&self, summary: &ImportSummary) -> String;
    fn format_workspace_import(&self, summary: &WorkspaceImportSummary) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub daemon_running: bool,
    pub socket_path: String,
    pub workspace: Option<WorkspaceStatus>,
}

fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn status_label(status: SourceStatus) -> &'static str {
    match status {
        SourceStatus::Pending => "pending",
        SourceStatus::Success => "ok",
        SourceStatus::Error => "error",
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("No results found for: {}\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "Search results for: \"{}\"", results.query).unwrap();
        writeln!(
            output,
            "Found {} of {} chunks in {}ms\n",
            results.len(),
            results.collection_size,
            results.duration_ms
        )
        .unwrap();

        for (i, hit) in results.hits.iter().enumerate() {
            writeln!(output, "{}. [Score: {:.3}]", i + 1, hit.score).unwrap();
            writeln!(
                output,
                "   Source: {} ({})",
                hit.source.source_title, hit.source.source_origin
            )
            .unwrap();
            writeln!(
                output,
                "   Chunk:  #{} [{}..{}]",
                hit.source.ordinal, hit.source.start_offset, hit.source.end_offset
            )
            .unwrap();
            writeln!(output, "   ---").unwrap();
            for line in preview(&hit.text, PREVIEW_CHARS).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let daemon_status = if status.daemon_running {
            "[RUNNING]"
        } else {
            "[STOPPED]"
        };
        writeln!(output, "Daemon:        {}", daemon_status).unwrap();
        writeln!(output, "  Socket:      {}", status.socket_path).unwrap();

        let Some(ws) = &status.workspace else {
            return output;
        };
        writeln!(output, "  Uptime:      {}s", ws.uptime_secs).unwrap();
        writeln!(output).unwrap();
        writeln!(output, "Embedding:     {} ({})", ws.model_id, ws.profile).unwrap();
        writeln!(output, "  Dimension:   {}", ws.dimension).unwrap();

        let backend = if ws.backend_healthy {
            "[CONNECTED]"
        } else {
            "[DISCONNECTED]"
        };
        writeln!(output, "Vector Store:  {} {}", ws.driver, backend).unwrap();
        if let Some(b) = &ws.builds {
            writeln!(output, "  Builds:      {} ({} failed)", b.total_builds, b.failed_builds).unwrap();
            writeln!(output, "  Avg Build:   {}ms", b.avg_latency_ms).unwrap();
        }
        writeln!(output).unwrap();

        writeln!(output, "Projects").unwrap();
        for p in &ws.projects {
            let index = match &p.index {
                Some(info) => format!("{} chunks, dim {}", info.count, info.dimension),
                None => "not indexed".to_string(),
            };
            let flag = if p.project.needs_reindex {
                " [needs reindex]"
            } else {
                ""
            };
            writeln!(
                output,
                "  {} {} - {} sources, {}{}",
                p.project.id, p.project.name, p.sources, index, flag
            )
            .unwrap();
        }

        output
    }

    fn format_index_report(&self, report: &IndexReport) -> String {
        let mut output = String::new();
        writeln!(output, "Indexing Complete").unwrap();
        writeln!(output, "-----------------").unwrap();
        writeln!(output, "Project:   {}", report.project_id).unwrap();
        writeln!(output, "Sources:   {}", report.sources_indexed).unwrap();
        if report.truncated_sources > 0 {
            writeln!(output, "Truncated: {}", report.truncated_sources).unwrap();
        }
        writeln!(output, "Chunks:    {}", report.chunk_count).unwrap();
        writeln!(output, "Dimension: {}", report.dimension).unwrap();
        writeln!(output, "Duration:  {}ms", report.duration_ms).unwrap();
        output
    }

    fn format_projects(&self, projects: &[Project]) -> String {
        if projects.is_empty() {
            return "No projects.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Projects").unwrap();
        writeln!(output, "--------").unwrap();
        for p in projects {
            writeln!(
                output,
                "  {}  {}  (created {})",
                p.id,
                p.name,
                format_timestamp(p.created_at)
            )
            .unwrap();
        }
        output
    }

    fn format_sources(&self, sources: &[Source]) -> String {
        if sources.is_empty() {
            return "No sources.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Sources").unwrap();
        writeln!(output, "-------").unwrap();
        for s in sources {
            writeln!(
                output,
                "  [{}] {}  {}  ({} chars)",
                status_label(s.status),
                s.id,
                s.title,
                s.text.chars().count()
            )
            .unwrap();
            writeln!(output, "        {}", s.origin).unwrap();
            if let Some(err) = &s.error {
                writeln!(output, "        error: {}", err).unwrap();
            }
        }
        output
    }

    fn format_import_summary(&self, summary: &ImportSummary) -> String {
        let mut output = String::new();
        writeln!(output, "Imported into {}", summary.project_id).unwrap();
        writeln!(output, "  Sources: {}", summary.sources_imported).unwrap();
        writeln!(
            output,
            "  Vectors: {}",
            if summary.vectors_imported { "yes" } else { "no" }
        )
        .unwrap();
        if summary.needs_reindex {
            writeln!(output, "  Reindex required").unwrap();
        }
        output
    }

    fn format_workspace_import(&self, summary: &WorkspaceImportSummary) -> String {
        let mut output = String::new();
        writeln!(
            output,
            "Imported {} projects ({}), {} sources",
            summary.projects.len(),
            summary.mode,
            summary.sources_imported()
        )
        .unwrap();
        for project in &summary.projects {
            let flag = if project.needs_reindex { "  (reindex required)" } else { "" };
            writeln!(
                output,
                "  {:<16} {:>5} sources{}",
                project.project_id, project.sources_imported, flag
            )
            .unwrap();
        }
        if !summary.removed.is_empty() {
            writeln!(output, "Removed: {}", summary.removed.join(", ")).unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize + ?Sized>(&self, value: &T) -> String {
        let result = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        result.unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string())
    }
}

impl Formatter for JsonFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        self.render(results)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(status)
    }

    fn format_index_report(&self, report: &IndexReport) -> String {
        self.render(report)
    }

    fn format_projects(&self, projects: &[Project]) -> String {
        self.render(&serde_json::json!({ "projects": projects }))
    }

    fn format_sources(&self, sources: &[Source]) -> String {
        self.render(&serde_json::json!({ "sources": sources }))
    }

    fn format_import_summary(&self, summary: &ImportSummary) -> String {
        self.render(summary)
    }

    fn format_workspace_import(&self, summary: &WorkspaceImportSummary) -> String {
        self.render(summary)
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string()
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_search_results(&self, results: &SearchResults) -> String {
        if results.is_empty() {
            return format!("## No results found\n\nQuery: `{}`\n", results.query);
        }

        let mut output = String::new();
        writeln!(output, "## Search Results\n").unwrap();
        writeln!(output, "**Query:** `{}`\n", results.query).unwrap();
        writeln!(
            output,
            "Found {} of {} chunks in {}ms\n",
            results.len(),
            results.collection_size,
            results.duration_ms
        )
        .unwrap();

        for (i, hit) in results.hits.iter().enumerate() {
            writeln!(output, "### {}. Score: {:.3}\n", i + 1, hit.score).unwrap();
            writeln!(
                output,
                "**Source:** {} (`{}`), chunk {}\n",
                hit.source.source_title, hit.source.source_origin, hit.source.ordinal
            )
            .unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", hit.text).unwrap();
            writeln!(output, "```\n").unwrap();
        }

        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let daemon_status = if status.daemon_running { "✅" } else { "❌" };
        writeln!(output, "### Daemon {}\n", daemon_status).unwrap();
        writeln!(output, "- **Socket:** `{}`", status.socket_path).unwrap();

        let Some(ws) = &status.workspace else {
            return output;
        };
        writeln!(output, "- **Uptime:** {}s", ws.uptime_secs).unwrap();
        writeln!(
            output,
            "- **Embedding:** {} ({}, dim {})",
            ws.model_id, ws.profile, ws.dimension
        )
        .unwrap();
        let backend = if ws.backend_healthy { "✅" } else { "❌" };
        writeln!(output, "- **Vector Store:** {} {}", ws.driver, backend).unwrap();
        writeln!(output).unwrap();

        writeln!(output, "### Projects\n").unwrap();
        writeln!(output, "| Project | Name | Sources | Chunks | Dimension |").unwrap();
        writeln!(output, "|---------|------|---------|--------|-----------|").unwrap();
        for p in &ws.projects {
            let (chunks, dim) = match &p.index {
                Some(info) => (info.count.to_string(), info.dimension.to_string()),
                None => ("-".to_string(), "-".to_string()),
            };
            writeln!(
                output,
                "| `{}` | {} | {} | {} | {} |",
                p.project.id, p.project.name, p.sources, chunks, dim
            )
            .unwrap();
        }
        output
    }

    fn format_index_report(&self, report: &IndexReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Indexing Complete\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Project | `{}` |", report.project_id).unwrap();
        writeln!(output, "| Sources | {} |", report.sources_indexed).unwrap();
        writeln!(output, "| Truncated | {} |", report.truncated_sources).unwrap();
        writeln!(output, "| Chunks | {} |", report.chunk_count).unwrap();
        writeln!(output, "| Dimension | {} |", report.dimension).unwrap();
        writeln!(output, "| Duration | {}ms |", report.duration_ms).unwrap();
        output
    }

    fn format_projects(&self, projects: &[Project]) -> String {
        if projects.is_empty() {
            return "## Projects\n\n*No projects.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Projects\n").unwrap();
        writeln!(output, "| Id | Name | Created |").unwrap();
        writeln!(output, "|----|------|---------|").unwrap();
        for p in projects {
            writeln!(
                output,
                "| `{}` | {} | {} |",
                p.id,
                p.name,
                format_timestamp(p.created_at)
            )
            .unwrap();
        }
        output
    }

    fn format_sources(&self, sources: &[Source]) -> String {
        if sources.is_empty() {
            return "## Sources\n\n*No sources.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Sources\n").unwrap();
        writeln!(output, "| Id | Title | Origin | Status |").unwrap();
        writeln!(output, "|----|-------|--------|--------|").unwrap();
        for s in sources {
            writeln!(
                output,
                "| `{}` | {} | `{}` | {} |",
                s.id,
                s.title,
                s.origin,
                status_label(s.status)
            )
            .unwrap();
        }
        output
    }

    fn format_import_summary(&self, summary: &ImportSummary) -> String {
        let mut output = String::new();
        writeln!(output, "## Import Complete\n").unwrap();
        writeln!(output, "- **Project:** `{}`", summary.project_id).unwrap();
        writeln!(output, "- **Sources:** {}", summary.sources_imported).unwrap();
        writeln!(output, "- **Vectors:** {}", summary.vectors_imported).unwrap();
        if summary.needs_reindex {
            writeln!(output, "- **Reindex required**").unwrap();
        }
        output
    }

    fn format_workspace_import(&self, summary: &WorkspaceImportSummary) -> String {
        let mut output = String::new();
        writeln!(output, "## Workspace Import ({})
", summary.mode).unwrap();
        writeln!(output, "| Project | Sources | Vectors | Reindex |").unwrap();
        writeln!(output, "|---------|---------|---------|---------|").unwrap();
        for p in &summary.projects {
            writeln!(
                output,
                "| `{}` | {} | {} | {} |",
                p.project_id, p.sources_imported, p.vectors_imported, p.needs_reindex
            )
            .unwrap();
        }
        if !summary.removed.is_empty() {
            writeln!(output, "\n**Removed:** {}", summary.removed.join(", ")).unwrap();
        }
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
