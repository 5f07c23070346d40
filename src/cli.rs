/// Process entry commands. Anything not recognised starts the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Sync { store_id: String },
    Help,
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Self, String> {
        match args.get(1).map(String::as_str) {
            None | Some("serve") => Ok(Command::Serve),
            Some("help") | Some("--help") | Some("-h") => Ok(Command::Help),
            Some("sync") => match args.get(2) {
                Some(store_id) if !store_id.is_empty() => Ok(Command::Sync { store_id: store_id.clone() }),
                _ => Err("usage: catalog-sync-service sync <store_id>".to_string()),
            },
            Some(other) => Err(format!("unknown command '{}'", other)),
        }
    }
}

pub fn print_usage() {
    println!("Catalog Sync Service");
    println!();
    println!("USAGE:");
    println!("    catalog-sync-service [COMMAND]");
    println!();
    println!("COMMANDS:");
    println!("    serve              Run the GraphQL API and the sync scheduler (default)");
    println!("    sync <store_id>    Run one catalog import for a store and exit");
    println!("    help               Print this message");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("catalog-sync-service").chain(list.iter().copied()).map(String::from).collect()
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse(&args(&[])), Ok(Command::Serve));
        assert_eq!(Command::parse(&args(&["-h"])), Ok(Command::Help));
        assert_eq!(Command::parse(&args(&["sync", "store_1"])), Ok(Command::Sync { store_id: "store_1".into() }));
        assert!(Command::parse(&args(&["sync"])).is_err());
        assert!(Command::parse(&args(&["migrate"])).is_err());
    }
}
