use std::path::PathBuf;

use clap::Parser;
use indicatif::ProgressIterator;
use paf_pipeline::data_loader::load_dataset;
use paf_pipeline::io::{FrameReport, GenerationReport, object_from_json, write_report};
use paf_pipeline::paf_generator::{PafGeneratorConfig, PartAffinityFieldsGenerator};
use paf_pipeline::record::{INSTANCES_KEY, PAFS_KEY};
use paf_pipeline::visualization::{max_magnitude, paf_view, render_edge_magnitude, render_pafs};
use paf_pipeline::{Pipeline, PipelineConfig};
use std::time::Instant;

#[derive(Parser)]
#[command(version, about, author)]
struct PafGenCli {
    /// labels json with a skeleton and labeled frames
    #[arg(short, long)]
    labels: PathBuf,

    /// pipeline config json; only the part affinity field options are used
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// output folder for the report and renderings
    #[arg(short, long, default_value = "paf_output")]
    output_dir: PathBuf,

    #[arg(long)]
    sigma: Option<f32>,

    #[arg(long)]
    output_stride: Option<usize>,

    /// examples processed concurrently, defaults to the number of cores
    #[arg(short = 'j', long)]
    num_parallel_calls: Option<usize>,

    /// save a png of the composite fields for every frame
    #[arg(long)]
    render: bool,

    /// save a png of this edge's magnitude for every frame
    #[arg(long)]
    render_edge: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = PafGenCli::parse();

    let (skeleton, dataset) = load_dataset(&cli.labels)?;
    let mut config: PafGeneratorConfig = match &cli.config {
        Some(path) => object_from_json::<PipelineConfig>(path)?.part_affinity_fields,
        None => PafGeneratorConfig::default(),
    };
    if let Some(sigma) = cli.sigma {
        config.sigma = sigma;
    }
    if let Some(output_stride) = cli.output_stride {
        config.output_stride = output_stride;
    }
    if cli.num_parallel_calls.is_some() {
        config.num_parallel_calls = cli.num_parallel_calls;
    }
    config.skeletons = vec![skeleton];
    let generator = PartAffinityFieldsGenerator::new(config)?;
    let report_header = GenerationReport {
        skeleton: generator.skeleton().name().to_string(),
        sigma: generator.config().sigma,
        output_stride: generator.config().output_stride,
        frames: Vec::new(),
    };
    let pipeline = Pipeline::new().with(generator);

    std::fs::create_dir_all(&cli.output_dir)?;
    let n_frames = dataset.iter().count();
    let now = Instant::now();
    let mut frames = Vec::with_capacity(n_frames);
    for (frame_idx, example) in pipeline
        .make_dataset(dataset)?
        .iter()
        .progress_count(n_frames as u64)
        .enumerate()
    {
        let example = example?;
        let pafs = example.require(PAFS_KEY)?;
        let view = paf_view(pafs)?;
        if cli.render {
            render_pafs(&view).save(cli.output_dir.join(format!("pafs_{frame_idx:05}.png")))?;
        }
        if let Some(edge) = cli.render_edge {
            render_edge_magnitude(&view, edge)?
                .save(cli.output_dir.join(format!("edge{edge}_{frame_idx:05}.png")))?;
        }
        frames.push(FrameReport {
            frame_idx,
            shape: pafs.shape().to_vec(),
            n_instances: example.require(INSTANCES_KEY)?.shape()[0],
            max_magnitude: max_magnitude(&view),
        });
    }
    let duration_sec = now.elapsed().as_secs_f64();
    log::info!("generating fields took {:.6} sec", duration_sec);
    log::info!("avg: {} sec", duration_sec / n_frames.max(1) as f64);

    let report = GenerationReport {
        frames,
        ..report_header
    };
    write_report(cli.output_dir.join("report.json"), &report)?;
    Ok(())
}
