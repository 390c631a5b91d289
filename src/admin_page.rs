//! Server-rendered HTML for the admin dashboard.
//!
//! One page: stats, upload form, document table with per-row delete, the
//! reindex button and an optional flash message carried in the query
//! string after a redirect. Every interpolated value is escaped.

use crate::models::{DocumentRecord, HistoryEntry};
use crate::stats::{format_bytes, format_ts, StoreStats};

/// Severity of a flash message; unknown values fall back to `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashKind {
    Success,
    Warning,
    Danger,
    Info,
}

impl FlashKind {
    pub fn parse(value: &str) -> Self {
        match value {
            "success" => FlashKind::Success,
            "warning" => FlashKind::Warning,
            "danger" => FlashKind::Danger,
            _ => FlashKind::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FlashKind::Success => "success",
            FlashKind::Warning => "warning",
            FlashKind::Danger => "danger",
            FlashKind::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Flash {
    pub message: String,
    pub kind: FlashKind,
}

pub struct Dashboard<'a> {
    pub username: &'a str,
    pub stats: StoreStats,
    pub documents: &'a [DocumentRecord],
    pub history: &'a [HistoryEntry],
    pub reindex_pending: bool,
    pub flash: Option<Flash>,
}

/// Escape HTML special characters for safe rendering.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

pub fn render_dashboard(page: &Dashboard<'_>) -> String {
    let flash = page
        .flash
        .as_ref()
        .map(|f| {
            format!(
                r#"<div class="flash flash-{}">{}</div>"#,
                f.kind.as_str(),
                html_escape(&f.message)
            )
        })
        .unwrap_or_default();

    let pending = if page.reindex_pending {
        r#"<p class="pending">Reindex pending: the API service will rebuild the index on its next reload.</p>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Documents - docrag admin</title>
    <style>{style}</style>
</head>
<body>
    <header>
        <span class="logo">docrag admin</span>
        <span class="user">Signed in as <strong>{username}</strong> · <a href="/logout">log out</a></span>
    </header>
    <main>
        {flash}
        <section class="stats">
            <div><span class="num">{total}</span> documents</div>
            <div><span class="num">{indexed}</span> indexed</div>
            <div><span class="num">{size_mb:.2}</span> MB</div>
        </section>

        <section>
            <h2>Upload</h2>
            <form action="/upload" method="post" enctype="multipart/form-data">
                <input type="file" name="files" multiple accept=".pdf,.txt,.docx,.md">
                <button type="submit">Upload</button>
            </form>
        </section>

        <section>
            <h2>Index</h2>
            {pending}
            <form action="/reindex" method="post">
                <button type="submit">Reindex all documents</button>
            </form>
            {history}
        </section>

        <section>
            <h2>Documents</h2>
            {table}
        </section>
    </main>
</body>
</html>"#,
        style = STYLE,
        username = html_escape(page.username),
        flash = flash,
        total = page.stats.total_docs,
        indexed = page.stats.indexed_docs,
        size_mb = page.stats.total_size_mb(),
        pending = pending,
        history = render_history(page.history),
        table = render_documents(page.documents),
    )
}

fn render_documents(documents: &[DocumentRecord]) -> String {
    if documents.is_empty() {
        return r#"<p class="empty">No documents uploaded yet.</p>"#.to_string();
    }

    let mut rows = String::new();
    for doc in documents {
        let status = if doc.indexed {
            r#"<span class="badge ok">indexed</span>"#
        } else {
            r#"<span class="badge wait">not indexed</span>"#
        };
        rows.push_str(&format!(
            r#"
            <tr>
                <td title="{stored}">{original}</td>
                <td>{kind}</td>
                <td>{size}</td>
                <td>{uploaded}</td>
                <td>{status}</td>
                <td>
                    <form action="/delete/{id}" method="post" onsubmit="return confirm('Delete this document?');">
                        <button type="submit" class="danger">Delete</button>
                    </form>
                </td>
            </tr>"#,
            stored = html_escape(&doc.filename),
            original = html_escape(&doc.original_name),
            kind = html_escape(&doc.file_type),
            size = format_bytes(doc.file_size.max(0) as u64),
            uploaded = format_ts(doc.uploaded_at),
            status = status,
            id = doc.id,
        ));
    }

    format!(
        r#"
    <table>
        <thead>
            <tr>
                <th>Name</th>
                <th>Type</th>
                <th>Size</th>
                <th>Uploaded</th>
                <th>Status</th>
                <th></th>
            </tr>
        </thead>
        <tbody>{}
        </tbody>
    </table>"#,
        rows
    )
}

fn render_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let items: String = history
        .iter()
        .map(|h| {
            format!(
                "<li>{} · {} · {} documents</li>",
                format_ts(h.created_at),
                html_escape(&h.action),
                h.documents_count
            )
        })
        .collect();
    format!(r#"<ul class="history">{}</ul>"#, items)
}

const STYLE: &str = "
body { font-family: system-ui, sans-serif; margin: 0; background: #f6f7f9; color: #222; }
header { display: flex; justify-content: space-between; padding: 12px 24px; background: #1f2937; color: #fff; }
header a { color: #cbd5e1; }
main { max-width: 960px; margin: 24px auto; padding: 0 16px; }
section { background: #fff; border-radius: 6px; padding: 16px; margin-bottom: 16px; }
.stats { display: flex; gap: 32px; }
.num { font-size: 1.6em; font-weight: 600; }
table { width: 100%; border-collapse: collapse; }
th, td { text-align: left; padding: 6px 8px; border-bottom: 1px solid #e5e7eb; }
.badge { padding: 2px 8px; border-radius: 10px; font-size: 0.85em; }
.badge.ok { background: #dcfce7; } .badge.wait { background: #fef9c3; }
.flash { padding: 10px 14px; border-radius: 6px; margin-bottom: 16px; }
.flash-success { background: #dcfce7; } .flash-warning { background: #fef9c3; }
.flash-danger { background: #fee2e2; } .flash-info { background: #e0f2fe; }
button.danger { color: #b91c1c; }
.pending { color: #92400e; }
.history { color: #555; font-size: 0.9em; }
";
