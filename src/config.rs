mod commandline;
mod defaults;
mod file;
pub(crate) mod primitives;

use clap::Parser;
use config::Config;
use std::path::Path;

use self::{
    commandline::{Args, ConfigFormat, Output},
    defaults::Defaults,
};

pub(crate) use commandline::Operation;
pub(crate) use file::{
    ConfigFile as Configuration, Media, OpenTelemetry, Postgres, Repo, Sled, Store, Tracing,
};

/// The loaded tubely configuration, along with the operation requested on the commandline
pub struct TubelyConfiguration {
    pub(crate) config: Configuration,
    pub(crate) operation: Operation,
}

pub(crate) fn configure() -> color_eyre::Result<TubelyConfiguration> {
    configure_from(Args::parse())
}

fn configure_from(args: Args) -> color_eyre::Result<TubelyConfiguration> {
    let Output {
        config_format,
        operation,
        save_to,
        config_file,
    } = args.into_output();

    let config = load(&config_format, config_file.as_deref())?;

    if let Some(save_to) = save_to {
        let output = toml::to_string_pretty(&config)?;
        std::fs::write(save_to, output)?;
    }

    Ok(TubelyConfiguration { config, operation })
}

// defaults < config file < TUBELY__ environment < commandline
fn load(
    config_format: &ConfigFormat,
    config_file: Option<&Path>,
) -> color_eyre::Result<Configuration> {
    let mut builder = Config::builder().add_source(Config::try_from(&Defaults::default())?);

    if let Some(path) = config_file {
        builder = builder.add_source(config::File::from(path));
    }

    let built = builder
        .add_source(config::Environment::with_prefix("TUBELY").separator("__"))
        .add_source(Config::try_from(config_format)?)
        .build()?;

    Ok(built.try_deserialize()?)
}
