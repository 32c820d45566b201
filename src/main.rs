use std::fs::OpenOptions;
use std::path::Path;

use log::info;
use traffic_mapf::batch::BatchRunner;
use traffic_mapf::{CityMap, PlannerConfig, Roadmap};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let map_path = args.get(1).map(String::as_str).unwrap_or("assets/map/small01.json");
    let num_cars: usize = args.get(2).and_then(|a| a.parse().ok()).unwrap_or(10);
    let num_runs: usize = args.get(3).and_then(|a| a.parse().ok()).unwrap_or(1);

    if let Err(err) = run(map_path, num_cars, num_runs) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run(map_path: &str, num_cars: usize, num_runs: usize) -> traffic_mapf::Result<()> {
    let path = Path::new(map_path);
    let map = if path.extension().is_some_and(|e| e == "json") {
        CityMap::from_json(&std::fs::read_to_string(path)?)?
    } else {
        CityMap::from_snapshot(&std::fs::read(path)?)?
    };

    let config = PlannerConfig::default();
    let roadmap = Roadmap::build(&map, &config)?;

    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("map");
    std::fs::create_dir_all("data")?;
    let mut out = OpenOptions::new()
        .create(true)
        .append(true)
        .open(format!("data/{stem}_{num_cars}_data.csv"))?;

    let mut rng = rand::thread_rng();
    let runner = BatchRunner::new(&roadmap, &config);
    let written = runner.run(num_runs, num_cars, &mut rng, &mut out)?;
    info!("{written}/{num_runs} run(s) produced data");
    Ok(())
}
