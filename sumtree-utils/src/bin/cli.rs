use std::{io, path::PathBuf};
use structopt::StructOpt;
use sumtree::{keys, migrate, Config, MemStore, PrefixStore, Tree, Weight};
use sumtree_utils::{dump, snapshot, Error};
use tracing::Level;

pub type Result<T> = anyhow::Result<T>;

type Store = PrefixStore<MemStore>;

#[derive(StructOpt)]
#[structopt(about = "CLI to inspect and modify sum trees in store snapshots")]
struct Opts {
    #[structopt(long, global = true, default_value = "store.json")]
    /// Snapshot file holding the store. Commands that modify the tree write it back.
    snapshot: PathBuf,
    #[structopt(long, global = true, default_value = "")]
    /// Prefix of the tree within the store
    prefix: String,
    #[structopt(long, global = true, default_value = "10")]
    /// Maximum number of children of a branch
    max_children: usize,
    #[structopt(long, global = true)]
    /// Keys are given and printed as hex instead of utf8
    hex: bool,
    #[structopt(short, parse(from_occurrences = set_log_level), global = true)]
    #[allow(dead_code)] // log level will bet set in [`set_log_level`]
    /// Increase verbosity
    verbosity: u64,
    #[structopt(subcommand)]
    cmd: Command,
}

fn set_log_level(verbosity: u64) -> u64 {
    let level = match verbosity {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();
    verbosity
}

#[derive(StructOpt)]
enum Command {
    /// Convert a tree from the legacy json node format to the binary format
    Migrate,
    /// Print the weight of a key
    Get {
        /// The key
        key: String,
    },
    /// Set the weight of a key
    Set {
        /// The key
        key: String,
        /// The new weight, a non-negative integer
        weight: String,
    },
    /// Remove a key
    Remove {
        /// The key
        key: String,
    },
    /// Print the total weight before, at and after a key
    SplitAcc {
        /// The key
        key: String,
    },
    /// Print the key owning a point in cumulative weight space
    Select {
        /// The point, a non-negative integer
        point: String,
    },
    /// Print the total weight of the tree
    Total,
    /// Check all invariants of the tree
    Check,
    /// Traverse the tree and dump it as dot. Can be piped directly:
    /// `sumtree-cli dump | dot -Tpng -o tree.png`.
    Dump {
        #[structopt(long)]
        /// Print an indented text rendering instead of dot
        text: bool,
    },
    /// List all keys and weights
    List,
}

struct Cli {
    hex: bool,
}

impl Cli {
    fn key(&self, text: &str) -> std::result::Result<Vec<u8>, Error> {
        Ok(if self.hex {
            hex::decode(text)?
        } else {
            text.as_bytes().to_vec()
        })
    }

    fn show(&self, key: &[u8]) -> String {
        if self.hex {
            hex::encode(key)
        } else {
            keys::display_key(key)
        }
    }
}

fn weight(text: &str) -> std::result::Result<Weight, Error> {
    Ok(text.parse::<Weight>()?)
}

fn main() -> Result<()> {
    let opts = Opts::from_args();
    let cli = Cli { hex: opts.hex };
    let store = snapshot::load(&opts.snapshot)?;
    let view = PrefixStore::new(store.clone(), opts.prefix.as_bytes());
    let tree: Tree<Store> = Tree::new(view, Config::new(opts.max_children))?;
    let modified = match opts.cmd {
        Command::Migrate => {
            let summary = migrate(tree.store())?;
            println!(
                "migrated {} branches and {} leaves",
                summary.branches, summary.leaves
            );
            summary.root.is_some()
        }
        Command::Get { key } => {
            match tree.get(&cli.key(&key)?)? {
                Some(weight) => println!("{}", weight),
                None => println!("absent"),
            }
            false
        }
        Command::Set { key, weight: text } => {
            let previous = tree.set(&cli.key(&key)?, weight(&text)?)?;
            if let Some(previous) = previous {
                println!("previous {}", previous);
            }
            true
        }
        Command::Remove { key } => match tree.remove(&cli.key(&key)?)? {
            Some(removed) => {
                println!("removed {}", removed);
                true
            }
            None => {
                println!("absent");
                false
            }
        },
        Command::SplitAcc { key } => {
            let res = tree.split_acc(&cli.key(&key)?)?;
            println!("left {}\nexact {}\nright {}", res.left, res.exact, res.right);
            false
        }
        Command::Select { point } => {
            match tree.select(&weight(&point)?)? {
                Some((key, weight)) => println!("{} {}", cli.show(&key), weight),
                None => println!("out of range, total is {}", tree.total()?),
            }
            false
        }
        Command::Total => {
            println!("{}", tree.total()?);
            false
        }
        Command::Check => {
            let violations = tree.check_invariants()?;
            for violation in &violations {
                println!("{}", violation);
            }
            if !violations.is_empty() {
                return Err(Error::InvariantsViolated(violations.len()).into());
            }
            println!("ok");
            false
        }
        Command::Dump { text } => {
            let stdout = io::stdout();
            if text {
                tree.dump(stdout.lock())?;
            } else {
                dump::graph(&tree, stdout.lock())?;
            }
            false
        }
        Command::List => {
            for item in tree.iter()? {
                let (key, weight) = item?;
                println!("{} {}", cli.show(&key), weight);
            }
            false
        }
    };
    if modified {
        snapshot::save(&store, &opts.snapshot)?;
    }
    Ok(())
}
