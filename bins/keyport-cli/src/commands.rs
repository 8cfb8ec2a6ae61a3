//! The closed command set and its static dispatch table.
//!
//! A command line is a vector of words. The first word picks a
//! [`CommandSpec`] from [`COMMANDS`]; its `parse` function turns the rest into
//! a [`Command`]. Unknown words are rejected with
//! [`CommandError::UnknownCommand`].

use std::fmt::Write as _;

use thiserror::Error;

use keyport_core::{Address, Amount, NetworkRegistry, parse_address};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid command \"{0}\"")]
    UnknownCommand(String),

    #[error("please provide {0}")]
    Missing(&'static str),

    #[error("\"{value}\" is not a valid {field}")]
    Invalid { field: &'static str, value: String },

    #[error("invalid command \"{got}\", one of the following commands \"{allowed}\"")]
    UnknownSubCommand { got: String, allowed: &'static str },
}

/// One parsed command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    New {
        password: String,
        network: String,
    },
    Delete {
        address: Address,
        password: String,
        network: String,
    },
    List {
        network: String,
    },
    Export {
        address: Address,
        password: String,
        network: String,
    },
    Import {
        /// A file path or the record/key text itself.
        source: String,
        password: String,
        network: String,
    },
    Copy {
        from: String,
        address: Address,
        password: String,
        to: String,
    },
    Password {
        address: Address,
        old_password: String,
        new_password: String,
        network: String,
    },
    GetEther {
        address: Address,
        network: String,
        amount: Option<Amount>,
    },
    Balance {
        address: Address,
        network: String,
    },
    SendEther {
        from: Address,
        password: String,
        network: String,
        to: Address,
        amount: String,
    },
}

/// One usage form shown by `--help-commands`.
pub struct Usage {
    pub description: &'static str,
    pub params: &'static [&'static str],
}

pub struct CommandSpec {
    pub name: &'static str,
    pub usage: &'static [Usage],
    pub parse: fn(&Args<'_>) -> Result<Command, CommandError>,
}

pub static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "new",
        usage: &[Usage {
            description: "Create account local and host",
            params: &["new <password> [local]", "new <password> <network_name or url>"],
        }],
        parse: parse_new,
    },
    CommandSpec {
        name: "delete",
        usage: &[Usage {
            description: "Delete account on local and host",
            params: &[
                "delete <address> <password> [local]",
                "delete <address> <password> <network_name or url>",
            ],
        }],
        parse: parse_delete,
    },
    CommandSpec {
        name: "copy",
        usage: &[
            Usage {
                description: "Copy local account to host",
                params: &["copy local <local_address> <password> <network_name or url>"],
            },
            Usage {
                description: "Copy host account to local",
                params: &["copy <network_name or url> <host_address> <password> [local]"],
            },
        ],
        parse: parse_copy,
    },
    CommandSpec {
        name: "list",
        usage: &[Usage {
            description: "List accounts on local and host",
            params: &["list [local]", "list <network_name or url>"],
        }],
        parse: parse_list,
    },
    CommandSpec {
        name: "export",
        usage: &[Usage {
            description: "Export local and host account to JSON or private key",
            params: &[
                "[--as-json] [--as-key] export <address> <password> [local]",
                "[--as-json] [--as-key] export <address> <password> <network_name or url>",
            ],
        }],
        parse: parse_export,
    },
    CommandSpec {
        name: "import",
        usage: &[Usage {
            description: "Import local and host account from JSON key file, or private key",
            params: &[
                "[--as-json] [--as-key] import <json_file or string> <password> [local]",
                "[--as-json] [--as-key] import <json_file or string> <password> <network_name or url>",
            ],
        }],
        parse: parse_import,
    },
    CommandSpec {
        name: "password",
        usage: &[Usage {
            description: "Change account password on local and host",
            params: &[
                "password <address> <old_password> <new_password> [local]",
                "password <address> <old_password> <new_password> <network_name or url>",
            ],
        }],
        parse: parse_password,
    },
    CommandSpec {
        name: "get",
        usage: &[Usage {
            description: "Get ether from faucet. The amount is only used with a faucet account",
            params: &["get ether <address> <network_name or url> [amount]"],
        }],
        parse: parse_get,
    },
    CommandSpec {
        name: "balance",
        usage: &[Usage {
            description: "Show the ether balance",
            params: &["balance <address> <network_name or url>"],
        }],
        parse: parse_balance,
    },
    CommandSpec {
        name: "send",
        usage: &[Usage {
            description: "Transfer ether to another account, signed by the node or locally with --local",
            params: &[
                "[--local] [--timeout <secs>] send ether <from_address> <password> <network_name or url> <to_address> <amount>",
            ],
        }],
        parse: parse_send,
    },
];

/// Positional words after the command name.
pub struct Args<'a> {
    words: &'a [String],
}

impl<'a> Args<'a> {
    fn get(&self, index: usize) -> Option<&'a str> {
        self.words.get(index).map(String::as_str)
    }

    fn required(&self, index: usize, what: &'static str) -> Result<String, CommandError> {
        self.get(index)
            .map(str::to_string)
            .ok_or(CommandError::Missing(what))
    }

    fn network_or_local(&self, index: usize) -> String {
        self.get(index).unwrap_or("local").to_string()
    }

    fn address(&self, index: usize, field: &'static str) -> Result<Address, CommandError> {
        let raw = self.get(index).ok_or(CommandError::Missing(field))?;
        parse_address(raw).map_err(|_| CommandError::Invalid {
            field,
            value: raw.to_string(),
        })
    }

    fn sub_command(&self, index: usize, allowed: &'static str) -> Result<(), CommandError> {
        match self.get(index) {
            Some(word) if word == allowed => Ok(()),
            Some(word) => Err(CommandError::UnknownSubCommand {
                got: word.to_string(),
                allowed,
            }),
            None => Err(CommandError::Missing("a sub command")),
        }
    }
}

/// Look up `words[0]` in [`COMMANDS`] and parse the rest.
pub fn parse_command(words: &[String]) -> Result<Command, CommandError> {
    let (name, rest) = words.split_first().ok_or(CommandError::Missing("a command"))?;
    let spec = COMMANDS
        .iter()
        .find(|spec| spec.name == name.as_str())
        .ok_or_else(|| CommandError::UnknownCommand(name.clone()))?;
    (spec.parse)(&Args { words: rest })
}

fn parse_new(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::New {
        password: args.required(0, "a password")?,
        network: args.network_or_local(1),
    })
}

fn parse_delete(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::Delete {
        address: args.address(0, "address")?,
        password: args.required(1, "a password")?,
        network: args.network_or_local(2),
    })
}

fn parse_copy(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::Copy {
        from: args.required(0, "a network name")?,
        address: args.address(1, "address")?,
        password: args.required(2, "a password")?,
        to: args.network_or_local(3),
    })
}

fn parse_list(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::List {
        network: args.network_or_local(0),
    })
}

fn parse_export(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::Export {
        address: args.address(0, "address")?,
        password: args.required(1, "a password")?,
        network: args.network_or_local(2),
    })
}

fn parse_import(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::Import {
        source: args.required(0, "json text, a key or a filename")?,
        password: args.required(1, "a password")?,
        network: args.network_or_local(2),
    })
}

fn parse_password(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::Password {
        address: args.address(0, "address")?,
        old_password: args.required(1, "the old password")?,
        new_password: args.required(2, "the new password")?,
        network: args.network_or_local(3),
    })
}

fn parse_get(args: &Args<'_>) -> Result<Command, CommandError> {
    args.sub_command(0, "ether")?;
    let amount = match args.get(3) {
        Some(raw) => Some(raw.parse::<Amount>().map_err(|_| CommandError::Invalid {
            field: "amount",
            value: raw.to_string(),
        })?),
        None => None,
    };
    Ok(Command::GetEther {
        address: args.address(1, "address")?,
        network: args.required(2, "a network name")?,
        amount,
    })
}

fn parse_balance(args: &Args<'_>) -> Result<Command, CommandError> {
    Ok(Command::Balance {
        address: args.address(0, "address")?,
        network: args.required(1, "a network name")?,
    })
}

fn parse_send(args: &Args<'_>) -> Result<Command, CommandError> {
    args.sub_command(0, "ether")?;
    Ok(Command::SendEther {
        from: args.address(1, "from_address")?,
        password: args.required(2, "a password")?,
        network: args.required(3, "a network name")?,
        to: args.address(4, "to_address")?,
        amount: args.required(5, "an amount")?,
    })
}

/// The `--help-commands` text.
pub fn help_text(app_name: &str, networks: &NetworkRegistry) -> String {
    let mut out = String::from("\nThe following commands can be used:\n");
    for spec in COMMANDS {
        for usage in spec.usage {
            let _ = writeln!(out, "\n{}", usage.description);
            for params in usage.params {
                let _ = writeln!(out, "    {app_name} {params}");
            }
        }
    }
    out.push_str("\nPossible network names can be one of the following:\n");
    for (name, spec) in networks.iter() {
        let target = spec.url.as_deref().unwrap_or("Local key storage");
        let _ = writeln!(out, "{name:20}: {target}");
    }
    out
}
