//! Process CLI commands: dispatch, status, list.

use anyhow::{Context, Result, anyhow, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use agentry_types::paging::{PageRequest, SortDirection};
use agentry_types::process::{
    DispatchOutcome, DispatchRequest, ExecutionMode, HTTP_ERROR, PROCESSING, ProcessId, ProcessSnapshot, TERMINATED,
    UNHANDLED_ERROR,
};

use crate::state::AppState;

fn parse_process_id(raw: &str) -> Result<ProcessId> {
    raw.parse()
        .map_err(|_| anyhow!("'{raw}' is not a valid process id"))
}

/// Run one action in-process.
///
/// # Examples
///
/// ```bash
/// agentry dispatch notebook open --input '{"title": "Ideas"}'
/// agentry dispatch notebook append --process-id <id> --input '{"text": "..."}'
/// ```
pub async fn dispatch(
    state: &AppState,
    agent: String,
    action: String,
    process_id: Option<String>,
    input: Option<String>,
    mode: Option<ExecutionMode>,
    json: bool,
) -> Result<()> {
    let mut request = DispatchRequest::new(agent, action);
    if let Some(raw) = process_id.as_deref() {
        request = request.process(parse_process_id(raw)?);
    }
    if let Some(raw) = input.as_deref() {
        let value = serde_json::from_str(raw).context("--input must be valid JSON")?;
        request = request.input(value);
    }
    if let Some(mode) = mode {
        request = request.mode(mode);
    }

    match state.orchestrator.dispatch(request).await? {
        DispatchOutcome::Completed(snapshot) => {
            print_snapshot(&snapshot, json)?;
            fail_on_error_state(&snapshot)
        }
        DispatchOutcome::Accepted(ack) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&ack)?);
            } else {
                println!();
                println!(
                    "  {} Accepted {}",
                    style("→").cyan().bold(),
                    style(ack.process_id).bold()
                );
                println!();
            }
            Ok(())
        }
    }
}

/// Show the current snapshot of a process.
pub async fn status(state: &AppState, agent: &str, process_id: &str, json: bool) -> Result<()> {
    let process_id = parse_process_id(process_id)?;
    let snapshot = state.orchestrator.status(agent, process_id).await?;
    print_snapshot(&snapshot, json)
}

/// List one page of an agent's processes.
pub async fn list(
    state: &AppState,
    agent: &str,
    limit: u64,
    skip: u64,
    sort: SortDirection,
    json: bool,
) -> Result<()> {
    let page = state
        .orchestrator
        .list(agent, PageRequest::new(limit, skip, sort))
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!();
        println!(
            "  {} No processes found. Start one with: {}",
            style("i").blue().bold(),
            style(format!("agentry dispatch {agent} <action>")).yellow()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Process").fg(Color::White),
        Cell::new("State").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);

    for summary in &page.items {
        table.add_row(vec![
            Cell::new(summary.process_id),
            state_cell(&summary.state),
            Cell::new(summary.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {} of {} process(es){}",
        style(page.items.len()).bold(),
        page.total_count,
        if page.has_next {
            format!(", next: --skip {}", skip + page.items.len() as u64)
        } else {
            String::new()
        }
    );
    println!();
    Ok(())
}

fn state_cell(state: &str) -> Cell {
    match state {
        TERMINATED => Cell::new("◌ terminated").fg(Color::DarkGrey),
        HTTP_ERROR | UNHANDLED_ERROR => Cell::new(format!("✗ {state}")).fg(Color::Red),
        PROCESSING => Cell::new("… processing").fg(Color::Yellow),
        other => Cell::new(format!("● {other}")).fg(Color::Green),
    }
}

fn print_snapshot(snapshot: &ProcessSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let state = match snapshot.state.as_str() {
        HTTP_ERROR | UNHANDLED_ERROR => style(snapshot.state.as_str()).red().bold(),
        TERMINATED => style(snapshot.state.as_str()).dim(),
        _ => style(snapshot.state.as_str()).green().bold(),
    };
    println!();
    println!(
        "  {}  {}/{}",
        state,
        style(&snapshot.agent).cyan(),
        snapshot.process_id
    );
    println!();
    for line in serde_json::to_string_pretty(&snapshot.data)?.lines() {
        println!("    {line}");
    }
    println!();
    if snapshot.available_actions.is_empty() {
        println!("  {}", style("No further actions").dim());
    } else {
        println!(
            "  Next actions: {}",
            style(snapshot.available_actions.join(", ")).yellow()
        );
    }
    println!();
    Ok(())
}

fn fail_on_error_state(snapshot: &ProcessSnapshot) -> Result<()> {
    if let Some((status_code, detail)) = snapshot.user_failure() {
        bail!("action failed ({status_code}): {detail}");
    }
    if let Some(error) = snapshot.unhandled_failure() {
        bail!("action raised an unhandled error: {error}");
    }
    Ok(())
}
