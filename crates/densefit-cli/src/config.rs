use crate::cli::ScoreArgs;
use crate::error::{CliError, Result};
use densefit::engine::config as core_config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialRestraintSection {
    #[serde(rename = "gmm-file")]
    gmm_file: Option<PathBuf>,
    atoms: Option<Vec<usize>>,
    temperature: Option<f64>,
    kbt: Option<f64>,
    #[serde(rename = "nl-cutoff")]
    nl_cutoff: Option<f64>,
    #[serde(rename = "nl-stride")]
    nl_stride: Option<u64>,
    sigma0: Option<f64>,
    #[serde(rename = "sigma-min")]
    sigma_min: Option<f64>,
    #[serde(rename = "sigma-max")]
    sigma_max: Option<f64>,
    #[serde(rename = "sigma-step")]
    sigma_step: Option<f64>,
    #[serde(rename = "sigma-mean")]
    sigma_mean: Option<f64>,
    serial: Option<bool>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(deny_unknown_fields)]
struct PartialMonteCarloSection {
    steps: Option<usize>,
    stride: Option<u64>,
    seed: Option<u64>,
}

/// Restraint settings as read from a TOML file, before CLI overrides are applied.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRestraintConfig {
    restraint: Option<PartialRestraintSection>,
    #[serde(rename = "monte-carlo")]
    monte_carlo: Option<PartialMonteCarloSection>,
}

fn parse_value<T: FromStr>(key: &str, value: &str, kind: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!("Invalid {} value for {}: {}", kind, key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(CliError::Config(format!(
            "Invalid boolean value for {}: {}",
            key, value
        ))),
    }
}

fn parse_atoms(key: &str, value: &str) -> Result<Vec<usize>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_value(key, s, "integer"))
        .collect()
}

impl PartialRestraintConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Applies `--set` values and explicit CLI flags, then validates through the core
    /// builder. Atoms default to every atom of the input structure.
    pub fn merge_with_cli(
        mut self,
        args: &ScoreArgs,
        structure_atoms: &[usize],
    ) -> Result<core_config::RestraintConfig> {
        self.apply_set_values(&args.set_values)?;

        let restraint = self.restraint.take().unwrap_or_default();
        let monte_carlo = self.monte_carlo.take().unwrap_or_default();

        let gmm_file = args
            .gmm_file
            .clone()
            .or(restraint.gmm_file)
            .ok_or_else(|| {
                CliError::Config(
                    "A value for 'restraint.gmm-file' is required either in the config file or via --gmm-file."
                        .to_string(),
                )
            })?;

        let atoms = restraint
            .atoms
            .unwrap_or_else(|| structure_atoms.to_vec());

        let mut builder = core_config::RestraintConfigBuilder::new()
            .atoms(atoms)
            .gmm_file(gmm_file)
            .serial(args.serial || restraint.serial.unwrap_or(false));

        builder = match (restraint.temperature, restraint.kbt) {
            (Some(_), Some(_)) => {
                return Err(CliError::Config(
                    "Specify only one of 'restraint.temperature' and 'restraint.kbt'.".to_string(),
                ));
            }
            (Some(kelvin), None) => builder.temperature(kelvin),
            (None, Some(kbt)) => builder.kbt(kbt),
            (None, None) => builder,
        };

        if let Some(v) = restraint.nl_cutoff {
            builder = builder.nl_cutoff(v);
        }
        if let Some(v) = restraint.nl_stride {
            builder = builder.nl_stride(v);
        }
        if let Some(v) = restraint.sigma0 {
            builder = builder.sigma0(v);
        }
        if let Some(v) = restraint.sigma_min {
            builder = builder.sigma_min(v);
        }
        if let Some(v) = restraint.sigma_max {
            builder = builder.sigma_max(v);
        }
        if let Some(v) = restraint.sigma_step {
            builder = builder.sigma_step(v);
        }
        if let Some(v) = restraint.sigma_mean {
            builder = builder.sigma_mean(v);
        }
        if let Some(v) = monte_carlo.steps {
            builder = builder.mc_steps(v);
        }
        if let Some(v) = monte_carlo.stride {
            builder = builder.mc_stride(v);
        }
        if let Some(seed) = args.seed.or(monte_carlo.seed) {
            builder = builder.seed(seed);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let Some((key, value)) = kv_pair.split_once('=') else {
                return Err(CliError::Config(format!(
                    "Invalid --set format: '{}'. Expected KEY=VALUE.",
                    kv_pair
                )));
            };
            let (key, value) = (key.trim(), value.trim());

            if let Some(field) = key.strip_prefix("monte-carlo.") {
                let section = self.monte_carlo.get_or_insert_with(Default::default);
                match field {
                    "steps" => section.steps = Some(parse_value(key, value, "integer")?),
                    "stride" => section.stride = Some(parse_value(key, value, "integer")?),
                    "seed" => section.seed = Some(parse_value(key, value, "integer")?),
                    _ => return Err(unsupported(key)),
                }
                continue;
            }

            let Some(field) = key.strip_prefix("restraint.") else {
                return Err(unsupported(key));
            };
            let section = self.restraint.get_or_insert_with(Default::default);
            match field {
                "gmm-file" => section.gmm_file = Some(PathBuf::from(value)),
                "atoms" => section.atoms = Some(parse_atoms(key, value)?),
                "temperature" => {
                    section.temperature = Some(parse_value(key, value, "float")?);
                    section.kbt = None;
                }
                "kbt" => {
                    section.kbt = Some(parse_value(key, value, "float")?);
                    section.temperature = None;
                }
                "nl-cutoff" => section.nl_cutoff = Some(parse_value(key, value, "float")?),
                "nl-stride" => section.nl_stride = Some(parse_value(key, value, "integer")?),
                "sigma0" => section.sigma0 = Some(parse_value(key, value, "float")?),
                "sigma-min" => section.sigma_min = Some(parse_value(key, value, "float")?),
                "sigma-max" => section.sigma_max = Some(parse_value(key, value, "float")?),
                "sigma-step" => section.sigma_step = Some(parse_value(key, value, "float")?),
                "sigma-mean" => section.sigma_mean = Some(parse_value(key, value, "float")?),
                "serial" => section.serial = Some(parse_bool(key, value)?),
                _ => return Err(unsupported(key)),
            }
        }
        Ok(())
    }
}

fn unsupported(key: &str) -> CliError {
    CliError::Config(format!(
        "Unsupported configuration key for --set: '{}'",
        key
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use densefit::engine::config::ThermalEnergy;
    use std::fs;

    const CONFIG: &str = r#"
[restraint]
gmm-file = "map.gmm"
temperature = 300.0
nl-cutoff = 0.01
nl-stride = 50
sigma0 = 0.5
sigma-min = 0.01
sigma-max = 2.0
sigma-step = 0.1
sigma-mean = 0.05

[monte-carlo]
steps = 5
stride = 10
seed = 42
"#;

    fn args(set_values: &[&str]) -> ScoreArgs {
        ScoreArgs {
            config: PathBuf::from("cfg.toml"),
            structure: PathBuf::from("atoms.csv"),
            trajectory: None,
            output: None,
            workers: 1,
            gmm_file: None,
            seed: None,
            serial: false,
            set_values: set_values.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn partial() -> PartialRestraintConfig {
        PartialRestraintConfig::from_toml(CONFIG).unwrap()
    }

    #[test]
    fn file_values_reach_the_core_config() {
        let config = partial().merge_with_cli(&args(&[]), &[1, 2, 3]).unwrap();
        assert_eq!(config.atoms, vec![1, 2, 3]);
        assert_eq!(config.gmm_file, PathBuf::from("map.gmm"));
        assert_eq!(config.thermal_energy, ThermalEnergy::Temperature(300.0));
        assert_eq!(config.neighbor_list.stride, 50);
        assert_eq!(config.sigma.max, 2.0);
        assert_eq!(config.monte_carlo.steps, 5);
        assert_eq!(config.monte_carlo.stride, 10);
        assert_eq!(config.monte_carlo.seed, Some(42));
        assert!(!config.serial);
    }

    #[test]
    fn cli_flags_override_file_values() {
        let mut args = args(&[]);
        args.gmm_file = Some(PathBuf::from("other.gmm"));
        args.seed = Some(7);
        args.serial = true;
        let config = partial().merge_with_cli(&args, &[1]).unwrap();
        assert_eq!(config.gmm_file, PathBuf::from("other.gmm"));
        assert_eq!(config.monte_carlo.seed, Some(7));
        assert!(config.serial);
    }

    #[test]
    fn set_values_override_file_values() {
        let args = args(&[
            "restraint.kbt=2.5",
            "restraint.atoms=4, 5",
            "restraint.sigma-max=3.0",
            "monte-carlo.steps=2",
            "restraint.serial=yes",
        ]);
        let config = partial().merge_with_cli(&args, &[1, 2, 3]).unwrap();
        assert_eq!(config.thermal_energy, ThermalEnergy::KbT(2.5));
        assert_eq!(config.atoms, vec![4, 5]);
        assert_eq!(config.sigma.max, 3.0);
        assert_eq!(config.monte_carlo.steps, 2);
        assert!(config.serial);
    }

    #[test]
    fn malformed_set_values_are_rejected() {
        for bad in ["restraint.sigma0", "restraint.sigma0=abc", "restraint.unknown=1", "other.key=1"] {
            let result = partial().merge_with_cli(&args(&[bad]), &[1]);
            assert!(matches!(result, Err(CliError::Config(_))), "{}", bad);
        }
    }

    #[test]
    fn unknown_keys_in_file_are_rejected() {
        let content = format!("{}\n[extra]\nvalue = 1\n", CONFIG);
        assert!(PartialRestraintConfig::from_toml(&content).is_err());
        assert!(PartialRestraintConfig::from_toml("[restraint]\nsigma = 1.0\n").is_err());
    }

    #[test]
    fn temperature_and_kbt_together_are_rejected() {
        let content = CONFIG.replace("temperature = 300.0", "temperature = 300.0\nkbt = 2.5");
        let result = PartialRestraintConfig::from_toml(&content)
            .unwrap()
            .merge_with_cli(&args(&[]), &[1]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn missing_gmm_file_is_reported() {
        let content = CONFIG.replace("gmm-file = \"map.gmm\"\n", "");
        let result = PartialRestraintConfig::from_toml(&content)
            .unwrap()
            .merge_with_cli(&args(&[]), &[1]);
        assert!(matches!(result, Err(CliError::Config(msg)) if msg.contains("gmm-file")));
    }

    #[test]
    fn invalid_bounds_surface_as_configuration_errors() {
        let result = partial().merge_with_cli(&args(&["restraint.sigma-min=5.0"]), &[1]);
        assert!(matches!(result, Err(CliError::Config(_))));
    }

    #[test]
    fn from_file_reports_parse_errors_with_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[restraint\n").unwrap();
        let err = PartialRestraintConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { path: p, .. } if p == path));
    }
}
