//! Subcommand parsing for the `friendgraph` binary.

use friendgraph_core::FriendGraphConfig;

pub const USAGE: &str = "\
friendgraph - Steam friends-graph crawler

Usage: friendgraph [command]

Commands:
  (none) | serve                       Start the HTTP server
  crawl <id> [<id>] [options]          Crawl one account, or two and find the path between them
      --depth N                        Depth cap, 1-4 (default 2)
      --workers N                      Concurrent requests, 1-60 (default 10)
      --force                          Re-fetch accounts that are already cached
  check-keys                           Validate every configured API key
  stat <id>                            Print the profile summary of one account
  help                                 Show this help message
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Crawl(CrawlArgs),
    CheckKeys,
    Stat { account: String },
    Help,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlArgs {
    pub targets: Vec<String>,
    pub depth: Option<u8>,
    pub workers: Option<usize>,
    pub force: bool,
}

impl CrawlArgs {
    /// Fold command-line overrides into `config`.
    pub fn apply(&self, config: &mut FriendGraphConfig) {
        if let Some(depth) = self.depth {
            config.crawl.depth_cap = depth;
            config.graph.depth_cap = depth;
        }
        if let Some(workers) = self.workers {
            config.crawl.workers = workers;
            config.graph.workers = workers;
        }
        if self.force {
            config.crawl.force_recrawl = true;
            config.always_regraph = true;
        }
    }
}

/// Parse arguments, program name excluded.
pub fn parse(args: &[String]) -> Result<Command, String> {
    let Some(first) = args.first() else {
        return Ok(Command::Serve);
    };
    match first.as_str() {
        "serve" => Ok(Command::Serve),
        "crawl" => parse_crawl(&args[1..]).map(Command::Crawl),
        "check-keys" => Ok(Command::CheckKeys),
        "stat" => match &args[1..] {
            [account] => Ok(Command::Stat {
                account: account.clone(),
            }),
            _ => Err("Usage: friendgraph stat <id>".into()),
        },
        "help" | "--help" | "-h" => Ok(Command::Help),
        other => Err(format!("Unknown command: {}", other)),
    }
}

fn parse_crawl(args: &[String]) -> Result<CrawlArgs, String> {
    let mut parsed = CrawlArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--depth" => parsed.depth = Some(flag_value(&mut iter, "--depth")?),
            "--workers" => parsed.workers = Some(flag_value(&mut iter, "--workers")?),
            "--force" => parsed.force = true,
            flag if flag.starts_with("--") => return Err(format!("Unknown option: {}", flag)),
            target => parsed.targets.push(target.to_string()),
        }
    }
    if !(1..=2).contains(&parsed.targets.len()) {
        return Err(format!(
            "crawl takes one or two account ids, got {}",
            parsed.targets.len()
        ));
    }
    Ok(parsed)
}

fn flag_value<'a, T: std::str::FromStr>(
    iter: &mut impl Iterator<Item = &'a String>,
    flag: &str,
) -> Result<T, String> {
    let raw = iter
        .next()
        .ok_or_else(|| format!("{} needs a value", flag))?;
    raw.parse()
        .map_err(|_| format!("{} expects a number, got {:?}", flag, raw))
}
