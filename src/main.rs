use clap::{Parser, Subcommand, ValueEnum};
use form_alignment::config::load_config_or_default;
use form_alignment::logging::{init_logging, new_correlation_id};
use form_alignment::pipeline::{collect_batch_items, JsonResultSink, ResultSink};
use form_alignment::visualization::{print_batch_summary, print_result};
use form_alignment::*;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "formalign")]
#[command(about = "Register scanned collection forms against a reference template")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Fiducial,
    Feature,
}

impl From<MethodArg> for AlignmentMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Fiducial => AlignmentMethod::FiducialMarks,
            MethodArg::Feature => AlignmentMethod::AutomaticFeatureMatch,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Align one captured form against a reference
    Align {
        /// Reference template image
        #[arg(short, long)]
        reference: PathBuf,

        /// Captured (scanned or photographed) form
        #[arg(short = 'i', long)]
        captured: PathBuf,

        #[arg(short, long, value_enum, default_value = "fiducial")]
        method: MethodArg,

        /// Number of alignment marks printed on the form
        #[arg(short = 'n', long)]
        marks: Option<usize>,

        /// Working directory for diagnostic images and the result file
        #[arg(short, long, default_value = "results/alignment")]
        output: PathBuf,
    },

    /// Align every image in a directory against one reference
    Batch {
        #[arg(short, long)]
        reference: PathBuf,

        /// Directory of captured forms
        #[arg(short, long)]
        inputs: PathBuf,

        #[arg(short, long, value_enum, default_value = "fiducial")]
        method: MethodArg,

        #[arg(short = 'n', long)]
        marks: Option<usize>,

        #[arg(short, long, default_value = "results/batch")]
        output: PathBuf,

        /// Worker threads (defaults to available cores)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Check that a reference template carries the expected number of marks
    CheckReference {
        #[arg(short, long)]
        reference: PathBuf,

        #[arg(short = 'n', long)]
        marks: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config_or_default(cli.config.as_deref());
    config.logging.global_level = match cli.verbose {
        0 => config.logging.global_level.clone(),
        1 => "info".to_string(),
        2 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    if cli.verbose > 0 {
        config.logging.engine_level = config.logging.global_level.clone();
        config.logging.batch_level = config.logging.global_level.clone();
    }
    let _guard = init_logging(&config.logging)?;

    match cli.command {
        Commands::Align {
            reference,
            captured,
            method,
            marks,
            output,
        } => handle_align(&config, &reference, &captured, method.into(), marks, &output)?,
        Commands::Batch {
            reference,
            inputs,
            method,
            marks,
            output,
            workers,
        } => {
            if let Some(workers) = workers {
                config.batch.workers = workers;
            }
            handle_batch(&config, &reference, &inputs, method.into(), marks, &output)?
        }
        Commands::CheckReference { reference, marks } => {
            handle_check_reference(&config, &reference, marks)?
        }
    }

    Ok(())
}

fn reference_spec(path: &Path, method: AlignmentMethod, marks: Option<usize>) -> anyhow::Result<ReferenceFormSpec> {
    let template_image = load_image(path)?;
    Ok(ReferenceFormSpec {
        template_image,
        alignment_method: method,
        expected_mark_count: marks,
    })
}

fn reference_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn handle_align(
    config: &Config,
    reference_path: &Path,
    captured_path: &Path,
    method: AlignmentMethod,
    marks: Option<usize>,
    output: &Path,
) -> anyhow::Result<()> {
    new_correlation_id();
    let engine = AlignmentEngine::new(config.alignment.clone());
    let reference = engine
        .prepare_reference(reference_spec(reference_path, method, marks)?)?
        .with_label(reference_label(reference_path));

    let captured = load_image(captured_path)?;
    println!(
        "Reference: {}x{}, Captured: {}x{}",
        reference.image().width(),
        reference.image().height(),
        captured.width(),
        captured.height()
    );

    let result = engine.align(&reference, &captured, output)?;
    print_result(&result);

    if config.batch.write_result_json {
        // The output directory is the document's working directory
        let sink = JsonResultSink::new(output.parent().unwrap_or(Path::new(".")));
        let document_id = output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        sink.record(&document_id, &result)?;
        println!("Result saved to {}", sink.result_path(&document_id).display());
    }

    Ok(())
}

fn handle_batch(
    config: &Config,
    reference_path: &Path,
    inputs: &Path,
    method: AlignmentMethod,
    marks: Option<usize>,
    output: &Path,
) -> anyhow::Result<()> {
    let items = collect_batch_items(inputs)?;
    println!("Found {} captured forms in {}", items.len(), inputs.display());

    let processor = BatchProcessor::new(AlignmentEngine::new(config.alignment.clone()), config.batch.clone());
    let reference = processor
        .engine()
        .prepare_reference(reference_spec(reference_path, method, marks)?)?
        .with_label(reference_label(reference_path));

    let report = processor.run(&reference, &items, output)?;
    print_batch_summary(&report);

    let report_path = output.join("batch_report.json");
    report.save_to_file(&report_path)?;
    println!("Batch report saved to {}", report_path.display());

    Ok(())
}

fn handle_check_reference(config: &Config, reference_path: &Path, marks: usize) -> anyhow::Result<()> {
    let engine = AlignmentEngine::new(config.alignment.clone());
    let spec = reference_spec(reference_path, AlignmentMethod::FiducialMarks, Some(marks))?;

    match engine.prepare_reference(spec) {
        Ok(reference) => {
            println!(
                "Reference OK: {} alignment marks found in {}",
                reference.marks().len(),
                reference_path.display()
            );
            for (i, mark) in reference.marks().iter().enumerate() {
                println!(
                    "  #{:<2} x={:<5} y={:<5} {}x{}",
                    i,
                    mark.x(),
                    mark.y(),
                    mark.width(),
                    mark.height()
                );
            }
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("Reference check failed: {}", e)),
    }
}
