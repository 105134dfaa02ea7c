//! Agent discovery CLI commands.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use agentry_types::process::UNINITIALIZED;

use crate::state::AppState;

/// List registered agents.
pub fn list_agents(state: &AppState, json: bool) -> Result<()> {
    let agents = state.orchestrator.agents();

    if json {
        println!("{}", serde_json::to_string_pretty(&agents)?);
        return Ok(());
    }

    println!();
    for agent in &agents {
        println!(
            "  {} {}  {}",
            style("●").green(),
            style(&agent.name).bold(),
            style(agent.actions.join(", ")).dim()
        );
    }
    println!();
    Ok(())
}

/// List an agent's actions with the states they run from.
pub fn list_actions(state: &AppState, agent: &str, json: bool) -> Result<()> {
    let actions = state.orchestrator.actions(agent)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&actions)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Action").fg(Color::White),
        Cell::new("Runs from").fg(Color::White),
        Cell::new("Description").fg(Color::White),
    ]);

    for action in &actions {
        let states = if action.initializer {
            Cell::new("new process").fg(Color::Cyan)
        } else {
            Cell::new(
                action
                    .allowed_states
                    .iter()
                    .filter(|s| s.as_str() != UNINITIALIZED)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(", "),
            )
        };
        table.add_row(vec![
            Cell::new(&action.name),
            states,
            Cell::new(action.description.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
