//! ECL Engine CLI
//!
//! Command-line interface for the IFRS 9 expected credit loss engine.
//! Exit codes: 0 success, 1 invalid inputs, 2 license invalid, 3 runtime
//! failure.

use chrono::Local;
use clap::{Parser, Subcommand};
use ecl_engine::account::{simulated_accounts_from_csv, AccountData};
use ecl_engine::assumptions::load_assumptions;
use ecl_engine::climate::ClimateRiskScenarios;
use ecl_engine::error::Result;
use ecl_engine::executor::Method;
use ecl_engine::forecast::{forecast, DynamicRange, ForecastType};
use ecl_engine::license::{load_sign_key, License, LicenseInformation};
use ecl_engine::montecarlo::{generate_scenarios, load_series_specs};
use ecl_engine::results::DEFAULT_GROUP_BY;
use ecl_engine::Scenarios;
use log::{error, info};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ecl-engine",
    version,
    about = "IFRS 9 expected credit loss engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print version and user license information
    About {
        /// Path to the user license file
        #[arg(long)]
        license: Option<PathBuf>,
    },

    /// Generate macroeconomic scenarios by Monte Carlo simulation
    GenerateScenarios {
        /// Path to the Monte-Carlo assumptions CSV
        assumptions: PathBuf,
        /// Path for the generated scenarios CSV
        outfile: PathBuf,
        /// Simulation seed
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Path to the user license file
        #[arg(long)]
        license: Option<PathBuf>,
    },

    /// Run the ECL model on the specified inputs
    Run {
        /// Path to the account-level data CSV
        account_data: PathBuf,
        /// Directory holding assumptions.csv, transition_matrices.csv and
        /// stage_map.csv
        assumptions: PathBuf,
        /// Path to the macroeconomic scenarios CSV
        scenarios: PathBuf,
        /// Output directory for the result reports
        outdir: PathBuf,
        /// Forecast mode: static, business_plan or dynamic
        #[arg(long, default_value = "static")]
        forecast_type: String,
        /// Execution method: map, thread_map or process_map
        #[arg(long, default_value = "map")]
        method: String,
        /// First reporting-date offset in months (dynamic mode)
        #[arg(long, default_value_t = 0)]
        start: u32,
        /// Stop offset in months, exclusive (dynamic mode)
        #[arg(long, default_value_t = 60)]
        stop: u32,
        /// Offset step in months (dynamic mode)
        #[arg(long, default_value_t = 12)]
        step: u32,
        /// Extra aggregation key fields (repeatable)
        #[arg(long)]
        by: Vec<String>,
        /// Path to the portfolio assumptions CSV (business-plan mode)
        #[arg(long)]
        portfolio_assumptions: Option<PathBuf>,
        /// Path to the climate-risk adjustments CSV
        #[arg(long)]
        climate_risk: Option<PathBuf>,
        /// Path to the user license file
        #[arg(long)]
        license: Option<PathBuf>,
    },

    /// Create a user license and save it to file
    #[command(hide = true)]
    CreateLicense {
        /// Private key used to sign licenses
        sign_key: PathBuf,
        /// Destination for the license file
        outfile: PathBuf,
        #[arg(long)]
        company_name: String,
        #[arg(long)]
        email: String,
        /// ISO date YYYY-MM-DD
        #[arg(long)]
        expiration_date: String,
    },

    /// Launch the graphical user interface
    Gui,
}

fn default_license_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ecl_engine_license")
}

fn check_license(path: Option<PathBuf>) -> Result<License> {
    let path = path.unwrap_or_else(default_license_path);
    let license = License::load(&path)?;
    let today = Local::now().date_naive();
    license.validate(today)?;
    let days = license.days_remaining(today)?;
    if days <= 30 {
        log::warn!(
            "license expires in {days} days on {}",
            license.information.expiration_date
        );
    }
    Ok(license)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{e}");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::About { license } => {
            let path = license.unwrap_or_else(default_license_path);
            println!("ECL Engine");
            println!("=========================");
            println!("Version: {}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("User License Information:");
            println!("=========================");
            match License::load(&path) {
                Ok(license) => {
                    let valid = license.validate(Local::now().date_naive()).is_ok();
                    println!("Company Name: {}", license.information.company_name);
                    println!("Email: {}", license.information.email);
                    println!("Expiration Date: {}", license.information.expiration_date);
                    println!("Product Code: {}", license.signature);
                    println!("Validity: {valid}");
                }
                Err(e) => println!("No usable license at {}: {e}", path.display()),
            }
            Ok(())
        }

        Command::GenerateScenarios {
            assumptions,
            outfile,
            seed,
            license,
        } => {
            check_license(license)?;
            info!("generating scenarios from {}", assumptions.display());
            let specs = load_series_specs(&assumptions)?;
            let scenarios = generate_scenarios(&specs, seed)?;
            info!(
                "saving {} scenarios to {}",
                scenarios.len(),
                outfile.display()
            );
            scenarios.to_csv_path(&outfile)?;
            info!("done");
            Ok(())
        }

        Command::Run {
            account_data,
            assumptions,
            scenarios,
            outdir,
            forecast_type,
            method,
            start,
            stop,
            step,
            by,
            portfolio_assumptions,
            climate_risk,
            license,
        } => {
            check_license(license)?;

            info!("loading assumptions from {}", assumptions.display());
            let assumptions = load_assumptions(&assumptions)?;
            info!("loading scenarios from {}", scenarios.display());
            let scenarios = Scenarios::from_csv_path(&scenarios)?;
            info!("loading account data from {}", account_data.display());
            let account_data = AccountData::from_csv_path(&account_data)?;

            let simulated = match &portfolio_assumptions {
                Some(path) => {
                    info!("loading portfolio assumptions from {}", path.display());
                    Some(simulated_accounts_from_csv(path)?)
                }
                None => None,
            };
            let climate = match &climate_risk {
                Some(path) => {
                    info!("loading climate-risk adjustments from {}", path.display());
                    Some(ClimateRiskScenarios::from_csv_path(path)?)
                }
                None => None,
            };

            info!("starting calculations");
            let results = forecast(
                ForecastType::parse(&forecast_type)?,
                Method::parse(&method)?,
                &account_data,
                simulated,
                &assumptions,
                &scenarios,
                climate.as_ref(),
                DynamicRange { start, stop, step },
            )?;

            let mut group_by: Vec<String> =
                DEFAULT_GROUP_BY.iter().map(|s| s.to_string()).collect();
            for field in by {
                if !group_by.contains(&field) {
                    group_by.push(field);
                }
            }
            info!(
                "saving {} result rows to {} (by {:?})",
                results.len(),
                outdir.display(),
                group_by
            );
            results.save(&outdir, &group_by)?;
            info!("done");
            Ok(())
        }

        Command::CreateLicense {
            sign_key,
            outfile,
            company_name,
            email,
            expiration_date,
        } => {
            info!("loading sign key from {}", sign_key.display());
            let key = load_sign_key(&sign_key)?;
            let information = LicenseInformation {
                company_name,
                email,
                expiration_date,
                author: std::env::var("USER").unwrap_or_else(|_| "unknown".to_string()),
            };
            info!("creating license for {}", information.company_name);
            let license = License::create(information, &key)?;
            license.save(&outfile)?;
            info!("license saved to {}", outfile.display());
            Ok(())
        }

        Command::Gui => {
            println!(
                "The graphical interface ships as a separate desktop bundle; \
                 this build exposes the command-line surface only."
            );
            Ok(())
        }
    }
}
