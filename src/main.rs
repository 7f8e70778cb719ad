//! Rehearsal runner.
//!
//! Loads a mod directory's configuration and dictionary, runs a session
//! against the in-memory host and renders each stdin line through a text
//! widget, printing what the player would see.
//!
//! Usage: `textswap [MOD_DIR] < lines.txt`

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use textswap::host::memory::MemoryHost;
use textswap::host::{MemberInfo, TypeInfo, TypeRef};
use textswap::{ManualScheduler, TextSwap};

const STRING_TABLE: &str = "Scriptable_String";
const WIDGET: &str = "TMPro.TextMeshProUGUI";

fn rehearsal_host() -> MemoryHost {
    let host = MemoryHost::new();
    host.add_type(TypeInfo {
        full_name: STRING_TABLE.to_string(),
        members: vec![MemberInfo::method(1, "GetText", &[TypeRef::Int], TypeRef::String)],
    });
    host.add_type(TypeInfo {
        full_name: WIDGET.to_string(),
        members: vec![
            MemberInfo::getter(10, "text", TypeRef::String),
            MemberInfo::setter(11, "text", TypeRef::String),
        ],
    });
    host
}

fn main() -> Result<()> {
    let mod_dir = match env::args().nth(1) {
        Some(dir) => PathBuf::from(dir),
        None => env::current_dir().context("Failed to resolve current directory")?,
    };

    let host = Arc::new(rehearsal_host());
    let scheduler = Arc::new(ManualScheduler::new());
    let mut session = TextSwap::initialize(host.clone(), &mod_dir, scheduler.clone())
        .context("Session startup failed")?;

    // Discovery and its follow-up fallback round run to completion here.
    scheduler.run_pending();
    session.on_update();

    let interval = session.config().scan_interval_frames;
    let stdin = io::stdin();
    let mut out = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let widget = host.add_widget(WIDGET, None);
        host.assign_text(&widget, &line)?;
        for _ in 0..interval {
            session.on_update();
        }
        writeln!(out, "{}", host.widget_text(&widget).unwrap_or_default())?;
        host.remove_widget(&widget);
    }
    out.flush()?;

    eprintln!(
        "discovery: {:?}, {} wrapper(s) bound, {} translation(s) loaded",
        session.discovery_state(),
        session.interceptor().len(),
        session.service().dictionary().len()
    );
    if let Some(collector) = session.collector() {
        eprintln!(
            "{} untranslated key(s) in {}",
            collector.len(),
            collector.report_path().display()
        );
    }
    Ok(())
}
