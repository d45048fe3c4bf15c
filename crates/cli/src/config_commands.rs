use clap::Subcommand;

use smarthub_config::HubConfig;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML.
    Show,
    /// Print where the configuration file lives.
    Path,
}

pub fn handle_config(action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let config = smarthub_config::discover_and_load();
            print!("{}", render(&config)?);
        },
        ConfigAction::Path => {
            println!("{}", smarthub_config::find_or_default_config_path().display());
        },
    }
    Ok(())
}

fn render(config: &HubConfig) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
