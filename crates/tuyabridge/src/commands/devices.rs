//! Device listing and detail.

use std::fmt::Write as _;
use std::sync::Arc;

use tabled::Tabled;
use tuyabridge_core::{Bridge, Device};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::error::CliError;
use crate::output;

const STATUS_PREVIEW: usize = 3;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Online")]
    online: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl DeviceRow {
    fn new(d: &Arc<Device>) -> Self {
        let mut status: Vec<String> = d
            .status
            .iter()
            .take(STATUS_PREVIEW)
            .map(|(code, value)| format!("{code}={value}"))
            .collect();
        if d.status.len() > STATUS_PREVIEW {
            status.push(format!("+{}", d.status.len() - STATUS_PREVIEW));
        }
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            category: d.category.clone(),
            kind: d.kind.to_string(),
            online: if d.online { "yes" } else { "no" }.into(),
            status: status.join(" "),
        }
    }
}

fn detail(d: &Arc<Device>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "ID:        {}", d.id);
    let _ = writeln!(out, "Name:      {}", d.name);
    let _ = writeln!(out, "Category:  {} ({})", d.category, d.kind);
    let _ = writeln!(out, "Online:    {}", d.online);

    if !d.status.is_empty() {
        let _ = writeln!(out, "Status:");
        for (code, value) in &d.status {
            let _ = writeln!(out, "  {code:<20} {value}");
        }
    }
    if !d.functions.is_empty() {
        let _ = writeln!(out, "Functions:");
        for f in &d.functions {
            let _ = writeln!(out, "  {:<20} {:<8} {}", f.code, f.data_type, f.values);
        }
    }
    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    args: &DevicesArgs,
    bridge: &Bridge,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let count = bridge.load_devices().await?;
    tracing::debug!(count, "devices loaded");

    let rendered = match args.id {
        Some(ref id) => {
            let device = bridge.device(id)?;
            output::render_single(global.output, &device, detail)
        }
        None => {
            let snapshot = bridge.devices_snapshot();
            output::render_list(global.output, snapshot.as_slice(), DeviceRow::new)
        }
    };
    output::print_output(&rendered);
    Ok(())
}
