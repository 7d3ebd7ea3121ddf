use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use penumbra::build::build_site;
use penumbra::config::{find_preferences_file, Config, Error as ConfigError};
use penumbra::theme::{
    Client, FileStorage, PreferenceStore, RootClassList, TerminalSignal,
};
use std::cell::RefCell;
use std::error::Error as StdError;
use std::path::Path;
use std::rc::Rc;

const DEFAULT_PROJECT: &str = ".";
const DEFAULT_OUTPUT: &str = "_site";

fn main() {
    tracing_subscriber::fmt::init();

    let project = Arg::with_name("project")
        .long("project")
        .short("p")
        .takes_value(true)
        .value_name("DIR")
        .default_value(DEFAULT_PROJECT)
        .help("A directory inside the project (searched upwards for penumbra.yaml)");

    let matches = App::new("penumbra")
        .about("Builds a static blog with a light/dark theme preference")
        .version(env!("CARGO_PKG_VERSION"))
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("build")
                .about("Renders the site into the output directory")
                .arg(project.clone())
                .arg(
                    Arg::with_name("output")
                        .long("output")
                        .short("o")
                        .takes_value(true)
                        .value_name("DIR")
                        .default_value(DEFAULT_OUTPUT)
                        .help("The directory to write the site to"),
                ),
        )
        .subcommand(
            SubCommand::with_name("theme")
                .about("Shows or toggles the stored theme preference")
                .arg(project)
                .arg(
                    Arg::with_name("action")
                        .possible_values(&["show", "toggle"])
                        .default_value("show"),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        ("build", Some(matches)) => build(matches),
        ("theme", Some(matches)) => theme(matches),
        _ => Ok(()),
    };

    if let Err(err) = result {
        eprintln!("Error: {}", err);
        let mut source = err.source();
        while let Some(err) = source {
            eprintln!("  caused by: {}", err);
            source = err.source();
        }
        std::process::exit(1);
    }
}

fn build(matches: &ArgMatches) -> Result<(), Box<dyn StdError>> {
    let config = load_config(matches)?;
    build_site(config)?;
    Ok(())
}

fn theme(matches: &ArgMatches) -> Result<(), Box<dyn StdError>> {
    let preferences_file = find_preferences_file(project_directory(matches))?;
    let classes = Rc::new(RefCell::new(RootClassList::default()));
    let mut store = PreferenceStore::new(Client {
        storage: Some(Box::new(FileStorage::new(&preferences_file))),
        signal: Some(Box::new(TerminalSignal::from_env())),
        scope: Some(Box::new(classes.clone())),
    });
    store.subscribe(|preference| {
        tracing::debug!(dark = preference.is_dark_enabled, "theme preference changed");
    });

    store.finalize();
    if matches.value_of("action") == Some("toggle") {
        store.toggle();
        tracing::info!(
            path = %preferences_file.display(),
            "stored theme preference"
        );
    }

    let preference = store.preference();
    println!(
        "{} (root class: \"{}\", theme-color: {})",
        match preference.is_dark_enabled {
            true => "dark",
            false => "light",
        },
        classes.borrow(),
        preference.theme_color(),
    );
    Ok(())
}

fn load_config(matches: &ArgMatches) -> Result<Config, ConfigError> {
    Config::from_directory(
        project_directory(matches),
        Path::new(matches.value_of("output").unwrap_or(DEFAULT_OUTPUT)),
    )
}

fn project_directory<'a>(matches: &'a ArgMatches) -> &'a Path {
    Path::new(matches.value_of("project").unwrap_or(DEFAULT_PROJECT))
}
