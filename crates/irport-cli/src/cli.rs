use std::path::PathBuf;

use clap::{Parser, Subcommand};
use irport_ir::TensorShape;

#[derive(Parser, Debug)]
#[command(name = "irport", version, about = "Emit and verify custom-op IR models")]
pub struct Cli {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write the CustomAddMul network as <stem>.xml + <stem>.bin
    Emit {
        /// Output path stem
        #[arg(long, default_value = "model")]
        stem: PathBuf,

        /// Graph name written on the net element
        #[arg(long, default_value = "CustomAddMul_Net")]
        name: String,

        /// Tensor shape as N,C,H,W
        #[arg(long, default_value = "1,3,224,224", allow_hyphen_values = true)]
        shape: TensorShape,
    },
    /// Load a model, run it on random inputs and compare with (in0 + in1) * in2
    Verify {
        /// Model path stem (<stem>.xml + <stem>.bin)
        #[arg(long, default_value = "model")]
        model: PathBuf,

        /// Device for inference (cpu, gpu or gpu.N)
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Custom layer config handed to the runtime
        #[arg(long)]
        custom_config: Option<PathBuf>,

        /// Inference precision hint (e.g. f32)
        #[arg(long)]
        precision: Option<String>,

        /// Extra runtime property, KEY=VALUE (repeatable)
        #[arg(long = "property", value_name = "KEY=VALUE")]
        properties: Vec<String>,

        /// Seed for the random inputs
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Maximum absolute difference per element
        #[arg(long, default_value_t = 1e-3)]
        tolerance: f32,

        /// Run a stress loop for this many seconds after verifying (0 = off)
        #[arg(long, default_value_t = 0)]
        stress_secs: u64,

        /// Log stress progress every N iterations
        #[arg(long, default_value_t = 10)]
        report_every: u64,
    },
}
