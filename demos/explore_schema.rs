use std::io::Cursor;
use std::sync::Arc;

use concept_forest::config::{EmbeddingConfig, ExplorerConfig, MergeConfig};
use concept_forest::embedding::EmbeddingTable;
use concept_forest::hierarchy::HealthCheck;
use concept_forest::merge::MergeStrategy;
use concept_forest::oracle::ConcatOracle;
use concept_forest::pipeline::Explorer;
use concept_forest::schema::StaticSchema;
use tracing_subscriber::EnvFilter;

// A handful of word vectors; anything else falls back to seeded random.
const VECTORS: &str = "\
pump 0.9 0.1 0.0 0.0
motor 0.8 0.3 0.0 0.1
valve 0.7 0.0 0.3 0.0
boiler 0.1 0.9 0.1 0.0
chiller 0.0 0.8 0.3 0.1
meter 0.0 0.1 0.9 0.2
sensor 0.1 0.0 0.8 0.3
site 0.0 0.0 0.1 0.9
temp 0.1 0.7 0.2 0.0
speed 0.8 0.0 0.1 0.1
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=concept_forest=debug shows every merge round.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let schema = StaticSchema::new([
        "pump.speed",
        "pump.temp",
        "motor.speed",
        "motor.current",
        "valve.position",
        "boiler.temp",
        "boiler.pressure",
        "chiller.temp",
        "meter.energy",
        "sensor.humidity",
        "site.name",
        "site.region.code",
    ]);

    let table = Arc::new(EmbeddingTable::from_reader(Cursor::new(VECTORS))?);

    let strategy: MergeStrategy = std::env::args()
        .nth(1)
        .as_deref()
        .unwrap_or("chunked_parallel")
        .parse()?;
    let config = ExplorerConfig::default()
        .with_merge(MergeConfig::new(strategy).with_workers(4).with_seed(42))
        .with_embedding(EmbeddingConfig::default().with_dimension(4).with_seed(7))
        .with_relations(true);

    let oracle = ConcatOracle::new().with_separator("/").with_relation("shares units with");
    let explorer = Explorer::from_table(config, table, Arc::new(oracle))?
        .with_schema(Arc::new(schema));

    let mut run = explorer.open_schema()?;
    if let Some(report) = &run.merge {
        println!(
            "{}: {} -> {} trees in {} rounds ({} merges)",
            report.strategy, report.initial_size, report.final_size, report.rounds, report.merges
        );
    }
    println!("opening view: {}", run.snapshot.to_json()?);

    // Open every top-level node, then close the first again.
    let tops: Vec<String> = run.snapshot.nodes[1..].iter().map(|n| n.id.clone()).collect();
    for id in &tops {
        let delta = run.graph.on_node_click(id)?;
        println!("click {id}: {}", delta.to_json()?);
    }
    if let Some(first) = tops.first() {
        let delta = run.graph.on_node_click(first)?;
        println!("click {first}: {}", delta.to_json()?);
    }

    let exported = run.graph.export_visible();
    println!(
        "visible graph: {} nodes, {} edges",
        exported.node_count(),
        exported.edge_count()
    );
    println!("{}", run.graph.health_check());
    Ok(())
}
