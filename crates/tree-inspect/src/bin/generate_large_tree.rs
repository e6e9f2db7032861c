use anyhow::{Context, Result};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::env;
use std::fs::File;
use std::io::{self, Write};
use tree_model::TreeNodeData;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    // Set default values
    let mut out_path = String::from("large_tree.json");
    let mut roots = 20;
    let mut depth = 4;
    let mut fanout = 6;

    // Parse arguments if provided
    if args.len() > 1 {
        out_path = args[1].clone();
    }
    if let Some(count) = args.get(2).and_then(|a| a.parse::<usize>().ok()) {
        roots = count;
    }
    if let Some(count) = args.get(3).and_then(|a| a.parse::<usize>().ok()) {
        depth = count;
    }
    if let Some(count) = args.get(4).and_then(|a| a.parse::<usize>().ok()) {
        fanout = count;
    }

    println!("Generating a random tree for engine testing:");
    println!("  Output file: {}", out_path);
    println!("  Roots: {}, depth: {}, max fanout: {}", roots, depth, fanout);

    // Use a seeded RNG for reproducibility
    let mut rng = StdRng::seed_from_u64(42);
    let mut next_id = 0;
    let nodes: Vec<TreeNodeData> = (0..roots)
        .map(|_| generate_node(&mut rng, &mut next_id, depth, fanout))
        .collect();

    let json = TreeNodeData::list_to_json(&nodes)?;
    let file = File::create(&out_path).with_context(|| format!("Failed to create {}", out_path))?;
    let mut writer = io::BufWriter::new(file);
    writer.write_all(json.as_bytes())?;
    writer.flush()?;

    println!("Done! Wrote {} nodes.", next_id);
    Ok(())
}

/// Generate one node and, while depth remains, a random number of children
fn generate_node(rng: &mut StdRng, next_id: &mut i64, depth: usize, fanout: usize) -> TreeNodeData {
    let id = *next_id;
    *next_id += 1;

    let word_length = rng.gen_range(4..12);
    let word: String = (0..word_length)
        .map(|_| rng.sample(Alphanumeric) as char)
        .collect();
    let mut node = TreeNodeData::new(id, format!("Node {} {}", id, word));

    // Roughly one node in twenty is disabled
    if rng.gen_ratio(1, 20) {
        node = node.disabled(true);
    }

    if depth > 0 && fanout > 0 {
        let children = rng.gen_range(0..=fanout);
        for _ in 0..children {
            node = node.child(generate_node(rng, next_id, depth - 1, fanout));
        }
    }
    node
}
