// SPDX-License-Identifier: Apache-2.0
// Copyright © 2025 Au-Zone Technologies. All Rights Reserved.

use bidshub_client::{
    BuilderConfig, Error, HubClient, Progress,
    datasets::{
        aomic_piop1::build_and_push_aomic_piop1, arc::build_and_push_arc,
        isles24::build_and_push_isles24,
    },
    validate::{
        ValidateOptions, aomic::validate_aomic_piop1_download,
        arc::{validate_arc_download, validate_arc_table},
        isles24::validate_isles24_download,
    },
};
use clap::{Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode};
use log::debug;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Upload BIDS neuroimaging datasets to a dataset hub.", long_about = None)]
struct Args {
    /// Dataset hub endpoint URL
    #[clap(long, env = "BIDS_HUB_ENDPOINT")]
    endpoint: Option<String>,

    /// Dataset hub API token
    #[clap(long, env = "BIDS_HUB_TOKEN")]
    token: Option<String>,

    /// Client Command
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Command {
    /// List all supported datasets.
    List,
    /// Store a hub token in the local token cache.  The token is prompted
    /// for when not passed via --token or BIDS_HUB_TOKEN, then verified
    /// against the hub before being saved.
    Login,
    /// Remove the token from the local token cache.
    Logout,
    /// Print the current hub token.  Typically exported into the
    /// BIDS_HUB_TOKEN environment variable for subsequent commands.
    Token,
    /// Show the identity the current token belongs to.
    Whoami,
    /// ARC (Aphasia Recovery Cohort) dataset commands.
    ///
    /// Source: OpenNeuro ds004884. License: CC0 (Public Domain).
    Arc {
        #[command(subcommand)]
        cmd: ArcCommand,
    },
    /// ISLES'24 stroke dataset commands.
    ///
    /// Source: Zenodo record 17652035. License: CC BY-NC-SA 4.0.
    Isles24 {
        #[command(subcommand)]
        cmd: Isles24Command,
    },
    /// AOMIC (Amsterdam Open MRI Collection) dataset commands.
    ///
    /// Source: OpenNeuro. License: CC0 (Public Domain).
    Aomic {
        #[command(subcommand)]
        cmd: AomicCommand,
    },
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum ArcCommand {
    /// Build (and optionally push) the ARC hub dataset.
    Build {
        /// Path to the ARC BIDS root directory (ds004884).
        bids_root: PathBuf,

        /// Hub dataset repository ID.
        #[clap(long, short = 'r', default_value = "hugging-science/arc-aphasia-bids")]
        repo: String,

        /// Push to the hub; by default the dataset is built but not pushed.
        #[clap(long)]
        no_dry_run: bool,
    },
    /// Validate an ARC download against the ds004884 census.
    ///
    /// Run this after downloading to ensure data integrity before pushing.
    Validate {
        /// Path to the ARC BIDS root directory (ds004884).
        bids_root: PathBuf,

        /// Run the external BIDS validator (requires npx, slow on large
        /// datasets).
        #[clap(long)]
        bids_validator: bool,

        /// Number of NIfTI files to spot-check for integrity.
        #[clap(long, short = 'n', default_value_t = 10)]
        sample_size: usize,

        /// Allowed fraction of missing files (0.0 to 1.0).
        #[clap(long, short = 't', default_value_t = 0.0)]
        tolerance: f32,
    },
    /// Build the ARC table locally and validate it against the census:
    /// schema, row and subject counts, per-modality run counts, and DWI
    /// gradient alignment.
    ValidateTable {
        /// Path to the ARC BIDS root directory (ds004884).
        bids_root: PathBuf,
    },
    /// Show information about the ARC dataset.
    Info,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Isles24Command {
    /// Build (and optionally push) the ISLES'24 hub dataset.
    Build {
        /// Path to the ISLES'24 root directory (e.g. train/).
        bids_root: PathBuf,

        /// Hub dataset repository ID.
        #[clap(long, short = 'r', default_value = "hugging-science/isles24-stroke")]
        repo: String,

        /// Push to the hub; by default the dataset is built but not pushed.
        #[clap(long)]
        no_dry_run: bool,
    },
    /// Validate an ISLES'24 download against the Zenodo v7 census.
    Validate {
        /// Path to the ISLES'24 root directory (e.g. train/).
        bids_root: PathBuf,

        /// Number of NIfTI files to spot-check for integrity.
        #[clap(long, short = 'n', default_value_t = 10)]
        sample_size: usize,

        /// Allowed fraction of missing files (0.0 to 1.0).  The default
        /// tolerates the optional modalities missing for some subjects.
        #[clap(long, short = 't', default_value_t = 0.1)]
        tolerance: f32,
    },
    /// Show information about the ISLES'24 dataset.
    Info,
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum AomicCommand {
    /// AOMIC-PIOP1 dataset (ds002785, 216 subjects).
    Piop1 {
        #[command(subcommand)]
        cmd: Piop1Command,
    },
}

#[derive(Subcommand, PartialEq, Clone, Debug)]
enum Piop1Command {
    /// Build (and optionally push) the AOMIC-PIOP1 hub dataset.
    Build {
        /// Path to the AOMIC-PIOP1 BIDS root directory (ds002785).
        bids_root: PathBuf,

        /// Hub dataset repository ID.
        #[clap(long, short = 'r', default_value = "hugging-science/aomic-piop1")]
        repo: String,

        /// Push to the hub; by default the dataset is built but not pushed.
        #[clap(long)]
        no_dry_run: bool,
    },
    /// Validate an AOMIC-PIOP1 download against the ds002785 census.
    Validate {
        /// Path to the AOMIC-PIOP1 BIDS root directory (ds002785).
        bids_root: PathBuf,

        /// Run the external BIDS validator (requires npx, slow on large
        /// datasets).
        #[clap(long)]
        bids_validator: bool,

        /// Number of NIfTI files to spot-check for integrity.
        #[clap(long, short = 'n', default_value_t = 10)]
        sample_size: usize,

        /// Allowed fraction of missing files (0.0 to 1.0).
        #[clap(long, short = 't', default_value_t = 0.0)]
        tolerance: f32,
    },
    /// Show information about the AOMIC-PIOP1 dataset.
    Info,
}

// Command handler functions

fn check_tolerance(tolerance: f32) -> Result<(), Error> {
    if !(0.0..=1.0).contains(&tolerance) {
        return Err(Error::InvalidParameters(format!(
            "tolerance must be between 0.0 and 1.0, got {}",
            tolerance
        )));
    }
    Ok(())
}

fn handle_list() {
    println!("Supported datasets:");
    println!("  arc         - Aphasia Recovery Cohort (OpenNeuro ds004884)");
    println!("  isles24     - ISLES 2024 Stroke (Zenodo)");
    println!("  aomic piop1 - AOMIC-PIOP1 (OpenNeuro ds002785)");
}

async fn handle_login(client: &HubClient, token: Option<String>) -> Result<(), Error> {
    let token = match token {
        Some(token) => token,
        None => Password::new("Hub API token")
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()
            .map_err(|e| Error::InvalidParameters(format!("token prompt failed: {}", e)))?,
    };

    let client = client.with_token(&token)?;
    let who = client.whoami().await?;
    client.save_token().await?;

    println!("Successfully logged into the hub as {}", who.name);
    Ok(())
}

async fn handle_logout(client: &HubClient) -> Result<(), Error> {
    client.logout().await?;
    println!("Token removed from the local cache");
    Ok(())
}

async fn handle_token(client: &HubClient) -> Result<(), Error> {
    let token = client.token().await;
    if token.is_empty() {
        return Err(Error::EmptyToken);
    }
    println!("{}", token);
    Ok(())
}

async fn handle_whoami(client: &HubClient) -> Result<(), Error> {
    let who = client.whoami().await?;
    match who.fullname {
        Some(fullname) => println!("{} ({})", who.name, fullname),
        None => println!("{}", who.name),
    }
    Ok(())
}

/// Wire a shard-progress channel into an indicatif bar.
fn shard_progress_bar() -> (
    tokio::sync::mpsc::Sender<Progress>,
    tokio::task::JoinHandle<()>,
) {
    use indicatif::{ProgressBar, ProgressStyle};
    use tokio::sync::mpsc;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{wide_bar:.yellow}] {pos}/{len} shards ({eta})",
        )
        .expect("progress template is valid")
        .progress_chars("█▇▆▅▄▃▂▁  "),
    );

    let (tx, mut rx) = mpsc::channel::<Progress>(16);
    let task = tokio::spawn(async move {
        while let Some(progress) = rx.recv().await {
            if progress.total > 0 {
                bar.set_length(progress.total as u64);
                bar.set_position(progress.current as u64);
            }
        }
        bar.finish_and_clear();
    });

    (tx, task)
}

async fn run_build<F, Fut>(
    bids_root: PathBuf,
    repo: String,
    no_dry_run: bool,
    build_and_push: F,
) -> Result<(), Error>
where
    F: FnOnce(BuilderConfig, Option<tokio::sync::mpsc::Sender<Progress>>) -> Fut,
    Fut: Future<Output = Result<(), Error>>,
{
    let dry_run = !no_dry_run;
    let config = BuilderConfig {
        bids_root: bids_root.clone(),
        repo_id: repo.clone(),
        split: None,
        dry_run,
    };

    println!("Processing dataset from: {}", bids_root.display());
    println!("Target hub repo: {}", repo);
    println!("Dry run: {}", dry_run);

    if dry_run {
        build_and_push(config, None).await?;
        println!("Dry run complete. Dataset built but not pushed.");
    } else {
        let (tx, task) = shard_progress_bar();
        build_and_push(config, Some(tx)).await?;
        task.await?;
        println!("Dataset pushed to: https://huggingface.co/datasets/{}", repo);
    }

    Ok(())
}

async fn handle_arc(client: &HubClient, cmd: ArcCommand) -> Result<(), Error> {
    match cmd {
        ArcCommand::Build {
            bids_root,
            repo,
            no_dry_run,
        } => {
            run_build(bids_root, repo, no_dry_run, |config, progress| async move {
                build_and_push_arc(client, &config, progress).await
            })
            .await
        }
        ArcCommand::Validate {
            bids_root,
            bids_validator,
            sample_size,
            tolerance,
        } => {
            check_tolerance(tolerance)?;
            let options = ValidateOptions {
                run_bids_validator: bids_validator,
                nifti_sample_size: sample_size,
                tolerance,
            };
            let result = validate_arc_download(&bids_root, &options);
            println!("{}", result);
            if !result.all_passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        ArcCommand::ValidateTable { bids_root } => {
            println!("Building ARC table from: {}", bids_root.display());
            let file_table = bidshub_client::datasets::arc::build_arc_file_table(&bids_root)?;
            let table = bidshub_client::build_table(
                &file_table,
                &bidshub_client::datasets::arc::arc_features(),
            )?;

            let result = validate_arc_table(&table);
            println!("{}", result);
            if !result.passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        ArcCommand::Info => {
            println!("Aphasia Recovery Cohort (ARC)");
            println!("{}", "=".repeat(40));
            println!("OpenNeuro ID: ds004884");
            println!("URL: https://openneuro.org/datasets/ds004884");
            println!("License: CC0 (Public Domain)");
            println!();
            println!("Contains:");
            println!("  - 230 chronic stroke patients");
            println!("  - 902 scanning sessions");
            println!("  - T1w, T2w, FLAIR, diffusion, fMRI");
            println!("  - Expert lesion masks");
            println!("  - WAB (Western Aphasia Battery) scores");
            println!();
            println!("Census modality counts (used by `bids-hub arc validate`):");
            println!("  - T1w: 444 sessions");
            println!("  - T2w: 440 sessions");
            println!("  - FLAIR: 233 sessions");
            println!("  - Lesion masks: 228 sessions (derivatives/lesion_masks)");
            Ok(())
        }
    }
}

async fn handle_isles24(client: &HubClient, cmd: Isles24Command) -> Result<(), Error> {
    match cmd {
        Isles24Command::Build {
            bids_root,
            repo,
            no_dry_run,
        } => {
            run_build(bids_root, repo, no_dry_run, |config, progress| async move {
                build_and_push_isles24(client, &config, progress).await
            })
            .await
        }
        Isles24Command::Validate {
            bids_root,
            sample_size,
            tolerance,
        } => {
            check_tolerance(tolerance)?;
            let options = ValidateOptions {
                run_bids_validator: false,
                nifti_sample_size: sample_size,
                tolerance,
            };
            let result = validate_isles24_download(&bids_root, &options);
            println!("{}", result);
            if !result.all_passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Isles24Command::Info => {
            println!("ISLES 2024 Stroke Dataset");
            println!("{}", "=".repeat(40));
            println!("Source: Zenodo (Record 17652035)");
            println!("License: CC BY-NC-SA 4.0");
            println!();
            println!("Contains:");
            println!("  - 149 subjects (Acute + Follow-up)");
            println!("  - Acute: NCCT, CTA, CTP");
            println!("  - Follow-up: DWI, ADC");
            println!("  - Lesion Segmentation Masks");
            Ok(())
        }
    }
}

async fn handle_aomic(client: &HubClient, cmd: AomicCommand) -> Result<(), Error> {
    let AomicCommand::Piop1 { cmd } = cmd;
    match cmd {
        Piop1Command::Build {
            bids_root,
            repo,
            no_dry_run,
        } => {
            run_build(bids_root, repo, no_dry_run, |config, progress| async move {
                build_and_push_aomic_piop1(client, &config, progress).await
            })
            .await
        }
        Piop1Command::Validate {
            bids_root,
            bids_validator,
            sample_size,
            tolerance,
        } => {
            check_tolerance(tolerance)?;
            let options = ValidateOptions {
                run_bids_validator: bids_validator,
                nifti_sample_size: sample_size,
                tolerance,
            };
            let result = validate_aomic_piop1_download(&bids_root, &options);
            println!("{}", result);
            if !result.all_passed() {
                std::process::exit(1);
            }
            Ok(())
        }
        Piop1Command::Info => {
            println!("AOMIC-PIOP1 (Population Imaging of Psychology 1)");
            println!("{}", "=".repeat(40));
            println!("OpenNeuro ID: ds002785");
            println!("URL: https://openneuro.org/datasets/ds002785");
            println!("License: CC0 (Public Domain)");
            println!();
            println!("Contains:");
            println!("  - 216 healthy adult subjects");
            println!("  - T1-weighted structural MRI");
            println!("  - Diffusion-weighted imaging (DWI)");
            println!("  - BOLD fMRI (resting-state + tasks)");
            println!("  - Demographics and psychometric data");
            println!();
            println!("Expected counts (from the Sci Data paper):");
            println!("  - Subjects: 216");
            println!("  - T1w: 216");
            println!("  - DWI: 211 (5 subjects missing)");
            println!("  - BOLD: 216");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let client = HubClient::new()?;
    let client = match &args.endpoint {
        Some(endpoint) => client.with_endpoint(endpoint)?,
        None => client,
    };
    let client = match &args.token {
        Some(token) => client.with_token(token)?,
        None => client,
    };
    debug!("Using hub endpoint {}", client.endpoint());

    match args.cmd {
        Command::List => {
            handle_list();
            Ok(())
        }
        Command::Login => handle_login(&client, args.token).await,
        Command::Logout => handle_logout(&client).await,
        Command::Token => handle_token(&client).await,
        Command::Whoami => handle_whoami(&client).await,
        Command::Arc { cmd } => handle_arc(&client, cmd).await,
        Command::Isles24 { cmd } => handle_isles24(&client, cmd).await,
        Command::Aomic { cmd } => handle_aomic(&client, cmd).await,
    }
}
