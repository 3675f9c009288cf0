use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use herd_tracker_rs::config::Algorithm;
use herd_tracker_rs::types::RawRecord;
use herd_tracker_rs::{BatchRunner, DatasetId, DatasetRegistry, Facility, FacilityConfig, PipelineConfig};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgorithmArg {
    Kmeans,
    Iforest,
    Dbscan,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(arg: AlgorithmArg) -> Self {
        match arg {
            AlgorithmArg::Kmeans => Algorithm::KMeans,
            AlgorithmArg::Iforest => Algorithm::IsolationForest,
            AlgorithmArg::Dbscan => Algorithm::Dbscan,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "herd_tracker")]
#[command(about = "Livestock behavior analysis over GPS + accelerometer telemetry", long_about = None)]
struct Args {
    /// Directory of ID{animal}_{ddmmyy}.json[.gz] datasets
    #[arg(long)]
    data_dir: PathBuf,

    /// Facility geometry (fences, rest zone, green zones, center)
    #[arg(long)]
    facility: Option<PathBuf>,

    /// Pipeline parameters; omitted values keep their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for reports
    #[arg(long, default_value = "herd_reports")]
    output_dir: PathBuf,

    /// Worker threads (default: available parallelism)
    #[arg(long)]
    workers: Option<usize>,

    /// Clustering algorithm for co-location events
    #[arg(long, value_enum)]
    algorithm: Option<AlgorithmArg>,

    /// Fixed RNG seed for reproducible clustering
    #[arg(long)]
    seed: Option<u64>,
}

/// Dataset id from a file name, if it follows the naming convention.
fn dataset_id(path: &Path) -> Option<DatasetId> {
    let name = path.file_name()?.to_str()?;
    let stem = name
        .strip_suffix(".json.gz")
        .or_else(|| name.strip_suffix(".json"))?;
    DatasetId::parse(stem)
}

fn load_records(path: &Path) -> Result<Vec<RawRecord>> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let reader = BufReader::new(GzDecoder::new(file));
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

fn load_registry(dir: &Path) -> Result<DatasetRegistry> {
    let mut registry = DatasetRegistry::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("reading data dir {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    entries.sort();

    for path in entries {
        let Some(id) = dataset_id(&path) else {
            log::debug!("Skipping {}", path.display());
            continue;
        };
        match load_records(&path) {
            Ok(records) => {
                log::debug!("Loaded {} records for {}", records.len(), id);
                registry.insert(id, records);
            }
            Err(e) => log::warn!("Failed {}: {}", path.display(), e),
        }
    }
    Ok(registry)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(algorithm) = args.algorithm {
        config.clustering.algorithm = algorithm.into();
    }
    if args.seed.is_some() {
        config.clustering.seed = args.seed;
    }
    config.validate()?;

    let facility_config = match &args.facility {
        Some(path) => FacilityConfig::from_json_file(path)
            .with_context(|| format!("loading facility {}", path.display()))?,
        None => {
            log::warn!("No facility given: geofence and zone checks are disabled");
            FacilityConfig::default()
        }
    };
    let facility = Facility::new(&facility_config)?;

    let registry = load_registry(&args.data_dir)?;
    if registry.is_empty() {
        anyhow::bail!("No ID{{animal}}_{{ddmmyy}}.json[.gz] datasets in {}", args.data_dir.display());
    }

    let mut runner = BatchRunner::new(&facility, &config);
    if let Some(workers) = args.workers {
        runner = runner.with_workers(workers);
    }
    let report = runner.run(&registry);

    let written = report
        .save_all(&args.output_dir)
        .with_context(|| format!("writing reports to {}", args.output_dir.display()))?;
    log::info!(
        "Wrote {} files to {} ({} days, {} failed)",
        written.len(),
        args.output_dir.display(),
        report.days.len(),
        report.failures.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataset_id_from_file_name() {
        let id = dataset_id(Path::new("/data/ID4021_150324.json.gz")).unwrap();
        assert_eq!(id.animal_id, "4021");
        assert_eq!(id.to_string(), "ID4021_150324");
        assert!(dataset_id(Path::new("ID4021_150324.json")).is_some());
        assert!(dataset_id(Path::new("notes.json")).is_none());
        assert!(dataset_id(Path::new("ID4021_150324.csv")).is_none());
    }
}
