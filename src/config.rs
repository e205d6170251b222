//! Command-line configuration for hyperstack.
//!
//! Two subcommands:
//!
//! - `export` - select sub-ranges of a stack and write them as OME-TIFF
//! - `info` - print the axes, data type and metadata of a stack
//!
//! # Environment Variables
//!
//! - `HYPERSTACK_BLOCK_SIZE` - Read cache block size in bytes (default: 64KB)
//! - `HYPERSTACK_CACHE_BLOCKS` - Read cache capacity in blocks (default: 64)
//! - `HYPERSTACK_LENIENT_BOUNDS` - Drop out-of-range selections instead of
//!   failing (default: false)

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::array::{BoundsPolicy, Selection, SelectionRequest};
use crate::export::ExportRequest;
use crate::io::{DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
use crate::source::SourceOptions;

// =============================================================================
// Default Values
// =============================================================================

/// Smallest accepted read cache block.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted read cache block.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// CLI Arguments
// =============================================================================

/// hyperstack - export sub-ranges of multi-dimensional microscopy stacks.
#[derive(Parser, Debug, Clone)]
#[command(name = "hyperstack")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Export a selection of a stack to an OME-TIFF file.
    Export(ExportConfig),

    /// Describe a stack without reading its pixels.
    Info(InfoConfig),
}

/// Read cache settings shared by every subcommand.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Block size in bytes for the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "HYPERSTACK_BLOCK_SIZE")]
    pub block_size: usize,

    /// Number of blocks the read cache holds.
    #[arg(long, default_value_t = DEFAULT_BLOCK_CACHE_CAPACITY, env = "HYPERSTACK_CACHE_BLOCKS")]
    pub cache_blocks: usize,
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn source_options(&self) -> SourceOptions {
        SourceOptions {
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
        }
    }
}

// =============================================================================
// Export
// =============================================================================

/// Arguments of `hyperstack export`.
///
/// Selections take `N`, an inclusive range `A-B`, or a list `A,B,C`.
#[derive(clap::Args, Debug, Clone)]
pub struct ExportConfig {
    /// Stack to read.
    pub input: PathBuf,

    /// OME-TIFF file to write.
    pub output: PathBuf,

    /// Stage positions to keep.
    #[arg(short = 'p', long)]
    pub position: Option<Selection>,

    /// Channels to keep.
    #[arg(short = 'c', long)]
    pub channel: Option<Selection>,

    /// Time points to keep.
    #[arg(short = 't', long)]
    pub time: Option<Selection>,

    /// Z slices to keep.
    #[arg(short = 'z', long)]
    pub z: Option<Selection>,

    /// Names for the exported channels (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub channel_names: Option<Vec<String>>,

    /// Drop out-of-range selections with a warning instead of failing.
    #[arg(long, default_value_t = false, env = "HYPERSTACK_LENIENT_BOUNDS")]
    pub lenient_bounds: bool,

    #[command(flatten)]
    pub cache: CacheConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl ExportConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()?;

        if self.input == self.output {
            return Err("output must differ from input".to_string());
        }
        if let Some(names) = &self.channel_names {
            if names.iter().any(|n| n.trim().is_empty()) {
                return Err("channel names must not be empty".to_string());
            }
        }
        Ok(())
    }

    pub fn bounds_policy(&self) -> BoundsPolicy {
        if self.lenient_bounds {
            BoundsPolicy::Lenient
        } else {
            BoundsPolicy::Strict
        }
    }

    pub fn selections(&self) -> SelectionRequest {
        SelectionRequest {
            position: self.position.clone(),
            channel: self.channel.clone(),
            time: self.time.clone(),
            z: self.z.clone(),
        }
    }

    /// The pipeline request these arguments describe.
    pub fn to_request(&self) -> ExportRequest {
        let request = ExportRequest::new(&self.output)
            .with_selections(self.selections())
            .with_bounds_policy(self.bounds_policy());
        match &self.channel_names {
            Some(names) => request.with_channel_names(names.clone()),
            None => request,
        }
    }
}

// =============================================================================
// Info
// =============================================================================

/// Output format of `hyperstack info`.
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InfoFormat {
    #[default]
    Text,
    Json,
}

/// Arguments of `hyperstack info`.
#[derive(clap::Args, Debug, Clone)]
pub struct InfoConfig {
    /// Stack to describe.
    pub input: PathBuf,

    /// Output format.
    #[arg(long, value_enum, default_value_t = InfoFormat::Text)]
    pub format: InfoFormat,

    #[command(flatten)]
    pub cache: CacheConfig,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), String> {
        self.cache.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
