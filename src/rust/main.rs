use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use attncat::{annotate, intercept, sensitivity, Annotated, AttncatConfig, TextCategorizer};
use clap::Parser;
use log::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Texts to categorize. A built-in demo set is used when none are given
    texts: Vec<String>,

    /// Output labels, comma separated
    #[arg(short, long, value_delimiter = ',', default_value = "positive,negative")]
    labels: Vec<String>,

    /// Name of the attention layer to intercept
    #[arg(short, long)]
    target: Option<String>,

    /// Weight above which a token is highlighted
    #[arg(long)]
    threshold: Option<f32>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Load a tokenizer.json instead of building a vocabulary from the texts
    #[arg(long)]
    tokenizer: Option<String>,

    /// Width of the token vectors
    #[arg(long, default_value_t = attncat::textcat::DEFAULT_WIDTH)]
    width: usize,

    /// Seed for the layer weights
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Print one JSON object per text
    #[arg(long)]
    json: bool,

    /// Show how much removing each token changes the first label's
    /// probability instead of attention weights
    #[arg(long)]
    sensitivity: bool,
}

const DEMO_TEXTS: &[&str] = &[
    "The new AI model shows remarkable accuracy in natural language processing tasks",
    "Team wins championship in dramatic overtime thriller with last-second goal",
    "This movie was a complete waste of time, terrible plot and awful acting",
    "A truly great film with an excellent cast",
    "This is a very short text",
];

fn vocabulary(texts: &[String]) -> BTreeSet<String> {
    texts
        .iter()
        .flat_map(|text| text.split(|c: char| !c.is_alphanumeric()))
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn load_config(args: &Args) -> Result<AttncatConfig> {
    let config = match &args.config {
        Some(path) => AttncatConfig::load(path)?,
        None => AttncatConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(target) = &args.target {
        config.target_layer = target.clone();
    }
    if let Some(threshold) = args.threshold {
        config.highlight.threshold = threshold;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    let texts: Vec<String> = if args.texts.is_empty() {
        DEMO_TEXTS.iter().map(|text| text.to_string()).collect()
    } else {
        args.texts.clone()
    };

    let start_time = Instant::now();
    info!("Building categorizer...");

    let mut builder = TextCategorizer::builder();
    builder = match &args.tokenizer {
        Some(path) => builder.with_custom_tokenizer(path)?,
        None => builder.with_vocab(vocabulary(&texts))?,
    };
    for label in &args.labels {
        builder = builder.add_label(label.as_str())?;
    }
    let mut model = builder.with_width(args.width).with_seed(args.seed).build()?;
    info!("Categorizer built in {:.2?}: {:?}", start_time.elapsed(), model.info().layer_names);

    let classify_start = Instant::now();
    if args.sensitivity {
        let base_color = &config.sensitivity.base_color;
        for result in sensitivity(&model, None, &texts, &config.sensitivity)? {
            emit(&result?, args.json, base_color)?;
        }
    } else {
        let session = intercept(&mut model, &config.target_layer)?;
        if session.weights().is_none() {
            warn!("Layer '{}' not found, printing predictions only", config.target_layer);
        }
        for result in annotate(&session, &texts, &config.highlight) {
            emit(&result?, args.json, &config.highlight.base_color)?;
        }
        session.release();
    }

    info!(
        "Processed {} texts in {:.2?} (average {:.2?})",
        texts.len(),
        classify_start.elapsed(),
        classify_start.elapsed() / texts.len().max(1) as u32
    );
    Ok(())
}

fn emit(annotated: &Annotated, json: bool, base_color: &str) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(annotated)?);
    } else {
        print_annotated(annotated, base_color);
    }
    Ok(())
}

fn print_annotated(annotated: &Annotated, base_color: &str) {
    let mut scores: Vec<_> = annotated.scores.iter().collect();
    scores.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));

    println!("\n{}", annotated.text);
    println!("  Predicted label: {}", annotated.label);
    for (label, score) in scores {
        println!("    {}: {:.1}%", label, score * 100.0);
    }
    if !annotated.tokens.is_empty() {
        println!("  Tokens:");
        for token in &annotated.tokens {
            let marker = if token.color == base_color { ' ' } else { '*' };
            println!("   {} {:<20} {:+.4}", marker, token.text.trim_end(), token.weight);
        }
    }
}
