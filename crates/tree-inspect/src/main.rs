//! Tree Inspect - prints the state of a tree loaded from a JSON file
//!
//! Usage:
//!
//! ```text
//! tree-inspect <tree.json> [--config config.json] [--mode none|single|multiple|cascade]
//!              [--search KEYWORD] [--select KEY]... [--expand-all] [--scroll PX]
//! ```
//!
//! `--scroll` turns on the virtual window and prints only the rows it spans.

use anyhow::{anyhow, bail, Context, Result};
use log::info;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tree_engine::prelude::*;

#[derive(Debug, Default)]
struct Options {
    tree_path: PathBuf,
    config_path: Option<PathBuf>,
    mode: Option<SelectionMode>,
    search: Option<String>,
    select: Vec<String>,
    expand_all: bool,
    scroll: Option<f64>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut options = Options::default();
        let mut tree_path = None;
        let mut args = args.iter();

        while let Some(arg) = args.next() {
            let mut value = |flag: &str| {
                args.next()
                    .cloned()
                    .ok_or_else(|| anyhow!("{} expects a value", flag))
            };
            match arg.as_str() {
                "--config" => options.config_path = Some(value("--config")?.into()),
                "--mode" => {
                    let mode = value("--mode")?;
                    options.mode = Some(
                        serde_json::from_value(serde_json::Value::String(mode.clone()))
                            .with_context(|| format!("Unknown selection mode '{}'", mode))?,
                    );
                }
                "--search" => options.search = Some(value("--search")?),
                "--select" => options.select.push(value("--select")?),
                "--expand-all" => options.expand_all = true,
                "--scroll" => {
                    let px = value("--scroll")?;
                    options.scroll = Some(
                        px.parse()
                            .with_context(|| format!("Invalid scroll offset '{}'", px))?,
                    );
                }
                flag if flag.starts_with("--") => bail!("Unknown option {}", flag),
                path if tree_path.is_none() => tree_path = Some(PathBuf::from(path)),
                extra => bail!("Unexpected argument {}", extra),
            }
        }

        options.tree_path = tree_path.ok_or_else(|| anyhow!("Missing path to a tree JSON file"))?;
        Ok(options)
    }
}

/// Match a command-line key against the tree. A string id wins, so "007"
/// still finds a node whose id is the string "007" rather than 7.
fn resolve_key(engine: &TreeEngine, raw: &str) -> NodeKey {
    let text = NodeKey::from(raw);
    if engine.get_node(&text).is_some() {
        return text;
    }
    raw.parse::<i64>().map(NodeKey::Num).unwrap_or(text)
}

fn load_tree(path: &Path) -> Result<Vec<TreeNodeData>> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tree file {}", path.display()))?;
    TreeNodeData::list_from_json(&json).with_context(|| format!("Invalid tree file {}", path.display()))
}

fn build_config(options: &Options) -> Result<TreeConfig> {
    let mut config = match &options.config_path {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            TreeConfig::from_json(&json)?
        }
        None => TreeConfig::default(),
    };
    if let Some(mode) = options.mode {
        config = config.selection_mode(mode);
    }
    if options.scroll.is_some() {
        config.virtual_scroll.enabled = true;
    }
    Ok(config)
}

/// Apply the requested operations and render the resulting rows.
fn inspect(options: &Options) -> Result<String> {
    let data = load_tree(&options.tree_path)?;
    let mut engine = TreeEngine::new(build_config(options)?, data);

    if options.expand_all {
        engine.expand_all();
    }
    for raw in &options.select {
        let key = resolve_key(&engine, raw);
        if !engine.select_node(&key, true) {
            info!("Selecting {} changed nothing", key);
        }
    }
    if let Some(keyword) = &options.search {
        engine.search(keyword);
    }

    let state = engine.get_state();
    let outline = state.outline();
    let mut report = String::new();

    match options.scroll {
        Some(px) => {
            let window = engine.scroll_to(px).clone();
            let rows: Vec<&str> = outline.lines().collect();
            if let Some(range) = window.range() {
                for row in &rows[range] {
                    report.push_str(row);
                    report.push('\n');
                }
            }
            report.push_str(&format!(
                "rows {}-{} of {} (offset {}px of {}px)\n",
                window.start_index, window.end_index, window.item_count, window.offset_y, window.total_height
            ));
        }
        None => report.push_str(&outline),
    }

    let state = engine.get_state();
    report.push_str(&format!(
        "{} nodes, {} visible, {} selected, {} matched\n",
        state.flat_nodes.len(),
        state.visible_nodes.len(),
        state.selected_ids.len(),
        state.matched_ids.len()
    ));
    Ok(report)
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    let options = Options::parse(&args)?;
    print!("{}", inspect(&options)?);
    Ok(())
}
