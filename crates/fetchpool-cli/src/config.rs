use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use fetchpool::{Job, JobId, Method, Url};

/// Runtime configuration for the `fetchpool` binary.
///
/// These settings control what is fetched and how many requests may be in
/// flight at once. All values are parsed from CLI arguments or environment
/// variables (a `.env` file is honoured), with defaults matching a small
/// interactive run.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fetchpool",
    version,
    about = "Fetch a batch of URLs concurrently on a bounded worker pool"
)]
pub struct CliArgs {
    /// URLs to fetch.
    ///
    /// Environment variable: `FETCH_TARGETS` (comma separated)
    #[arg(env = "FETCH_TARGETS", value_delimiter = ',', required = true, num_args = 1..)]
    pub targets: Vec<String>,

    /// How many times each target is submitted.
    ///
    /// Every submission is an independent job with its own identity, which is
    /// handy for load-testing a single endpoint.
    ///
    /// Environment variable: `FETCH_REPEAT`
    #[arg(short, long, env = "FETCH_REPEAT", default_value_t = 1)]
    pub repeat: usize,

    /// Number of worker tasks, i.e. the maximum number of requests in flight.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(short, long, env = "NUM_WORKERS", default_value_t = 2)]
    pub workers: usize,

    /// HTTP method used for every request.
    ///
    /// Environment variable: `FETCH_METHOD`
    #[arg(short, long, env = "FETCH_METHOD", default_value_t = String::from("GET"))]
    pub method: String,

    /// Total time budget for one request, in milliseconds.
    ///
    /// Environment variable: `FETCH_TIMEOUT_MS`
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value_t = 5_000)]
    pub timeout_ms: u64,

    /// How long to wait for each worker to exit once the batch is done, in
    /// milliseconds.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_MS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_MS", default_value_t = 3_000)]
    pub shutdown_timeout_ms: u64,

    /// Print a JSON report instead of one line per result.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub targets: Vec<Url>,
    pub repeat: usize,
    pub workers: usize,
    pub method: Method,
    pub timeout: Duration,
    pub shutdown_timeout: Duration,
    pub json: bool,
}

impl CliConfig {
    /// Expands targets into jobs with identities `0..targets * repeat`.
    ///
    /// Each target's repetitions are contiguous, so job `i` fetches
    /// `targets[i / repeat]`.
    pub fn jobs(&self) -> Vec<Job> {
        self.targets
            .iter()
            .flat_map(|target| core::iter::repeat_n(target, self.repeat))
            .enumerate()
            .map(|(id, target)| Job::from_parts(id as JobId, target.clone(), self.method.clone()))
            .collect()
    }
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.repeat == 0 {
            bail!("FETCH_REPEAT must be greater than 0");
        }

        if args.timeout_ms == 0 {
            bail!("FETCH_TIMEOUT_MS must be greater than 0");
        }

        if args.shutdown_timeout_ms == 0 {
            bail!("SHUTDOWN_TIMEOUT_MS must be greater than 0");
        }

        args.targets
            .len()
            .checked_mul(args.repeat)
            .ok_or_else(|| anyhow::anyhow!("Overflow in batch size computation"))?;

        // Validate every target and the method through the same rules the
        // library applies to jobs.
        let mut targets = Vec::with_capacity(args.targets.len());
        let mut method = Method::GET;
        for raw in &args.targets {
            let job = Job::new(0, raw.trim(), &args.method)
                .with_context(|| format!("invalid target `{raw}`"))?;
            method = job.method().clone();
            targets.push(job.target().clone());
        }

        Ok(Self {
            targets,
            repeat: args.repeat,
            workers: args.workers,
            method,
            timeout: Duration::from_millis(args.timeout_ms),
            shutdown_timeout: Duration::from_millis(args.shutdown_timeout_ms),
            json: args.json,
        })
    }
}
