use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use clap::{ArgAction, Parser, Subcommand};
mod prompt;
use passvault::{
    Account, AccountUpdate, CustomFieldUpdate, ExpiryStatus, NewAccount, NewCustomField,
    PasswordPolicy, Strength, Unlocker, Vault, VaultError, VaultPaths, check_password_strength,
    generate_password,
};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

/// Unlock attempts allowed at an interactive prompt.
const MAX_UNLOCK_ATTEMPTS: u32 = 3;
/// How long a copied password stays on the clipboard.
const CLIPBOARD_CLEAR_AFTER: Duration = Duration::from_secs(15);

#[derive(Debug, Parser)]
#[command(name = "passvault")]
#[command(version, about = "Local, offline credential vault with field-level encryption.")]
struct Cli {
    /// Directory holding the vault data file and its salt
    #[arg(long, global = true, value_name = "PATH", env = "PASSVAULT_DIR")]
    dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Creates a new, empty vault
    Init,

    /// Stores a new account; the password is prompted for unless given
    #[command(arg_required_else_help = true)]
    Add {
        title: String,
        user_name: String,
        /// Account password (visible in shell history and the process list;
        /// omit it to be prompted, or pipe it on stdin)
        #[arg(long)]
        password: Option<String>,
        /// Generate a random password of this length instead
        #[arg(long, value_name = "LENGTH", conflicts_with = "password")]
        generate: Option<usize>,
        #[command(flatten)]
        extra: AccountExtras,
    },

    /// Lists stored accounts
    List {
        /// Only accounts whose title, user name or URL contain this text
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Shows one account with its custom fields
    #[command(arg_required_else_help = true)]
    Show {
        id: u64,
        /// Copy the password to the clipboard instead of printing it
        #[arg(short, long, default_value_t = false)]
        copy: bool,
    },

    /// Changes fields of an existing account
    #[command(arg_required_else_help = true)]
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long = "user")]
        user_name: Option<String>,
        /// New password (visible in shell history and the process list)
        #[arg(long)]
        password: Option<String>,
        #[command(flatten)]
        extra: AccountExtras,
    },

    /// Removes an account and all of its custom fields
    #[command(arg_required_else_help = true)]
    Remove { id: u64 },

    /// Manages custom key/value fields of an account
    #[command(subcommand)]
    Field(FieldCommands),

    /// Prints a random password
    Generate {
        #[arg(short, long, default_value_t = 16)]
        length: usize,
        #[arg(long)]
        no_digits: bool,
        #[arg(long)]
        no_uppercase: bool,
        #[arg(long)]
        no_special: bool,
    },

    /// Rates the strength of a password
    #[command(arg_required_else_help = true)]
    Strength { password: String },
}

#[derive(Debug, Subcommand)]
enum FieldCommands {
    /// Attaches a custom field to an account
    #[command(arg_required_else_help = true)]
    Add {
        account_id: u64,
        name: String,
        value: String,
    },

    /// Changes a custom field
    #[command(arg_required_else_help = true)]
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        value: Option<String>,
    },

    /// Removes a custom field
    #[command(arg_required_else_help = true)]
    Remove { id: u64 },
}

#[derive(Debug, clap::Args)]
struct AccountExtras {
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Expiration date (YYYY-MM-DD or DD-MM-YYYY)
    #[arg(long, value_name = "DATE", value_parser = parse_date)]
    expires: Option<NaiveDate>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .map_err(|_| format!("invalid date '{s}', expected YYYY-MM-DD"))
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "passvault=warn",
        1 => "passvault=info",
        _ => "passvault=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_paths(dir: Option<PathBuf>) -> Result<VaultPaths> {
    match dir {
        Some(d) => Ok(VaultPaths::in_dir(d)),
        None => VaultPaths::default_location().context("could not determine platform directories"),
    }
}

/// Reads the master password and unlocks, re-prompting on a wrong password
/// when running at a terminal.
fn open_vault(paths: VaultPaths) -> Result<Vault> {
    if !paths.vault_exists() {
        bail!("vault does not exist; run `passvault init` first");
    }

    let unlocker = Unlocker::new(paths).context("vault file missing or corrupt")?;
    let attempts = if prompt::is_interactive() {
        MAX_UNLOCK_ATTEMPTS
    } else {
        1
    };

    for attempt in 1..=attempts {
        let password = prompt::read_master_password()?;
        match unlocker.attempt(&password) {
            Ok(vault) => return Ok(vault),
            Err(VaultError::AuthenticationFailure) if attempt < attempts => {
                eprintln!("wrong master password, try again");
            }
            Err(VaultError::AuthenticationFailure) => break,
            Err(e) => return Err(e).context("vault file missing or corrupt"),
        }
    }

    bail!("wrong master password")
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Cli::parse();
    init_tracing(args.verbose);

    match args.command {
        Commands::Init => {
            let paths = resolve_paths(args.dir)?;
            if paths.vault_exists() {
                bail!("vault already exists at {}", paths.data_file.display());
            }

            let password = prompt::read_new_master_password()?;
            let strength = check_password_strength(&password);
            if strength != Strength::Strong {
                eprintln!("warning: master password strength is {strength}");
            }

            let vault = Vault::create(paths, &password)?;
            println!("vault initialized at {}", vault.paths().data_file.display());
        }
        Commands::Add {
            title,
            user_name,
            password,
            generate,
            extra,
        } => {
            let mut vault = open_vault(resolve_paths(args.dir)?)?;
            let password = match (password, generate) {
                (Some(pw), _) => Zeroizing::new(pw),
                (None, Some(len)) => generate_password(len, PasswordPolicy::default())?,
                (None, None) => prompt::read_secret("Account password")?,
            };

            let account = vault.store_mut().create_account(NewAccount {
                title,
                user_name,
                password: password.to_string(),
                url: extra.url,
                notes: extra.notes,
                expiration_date: extra.expires,
            })?;
            println!("stored account '{}' (id {})", account.title(), account.id());
        }
        Commands::List { search } => {
            let vault = open_vault(resolve_paths(args.dir)?)?;
            let accounts = match search {
                Some(q) => vault.store().find_accounts(&q)?,
                None => vault.store().list_accounts()?,
            };

            if accounts.is_empty() {
                println!("No accounts stored.");
                return Ok(());
            }
            print_account_table(&accounts);
        }
        Commands::Show { id, copy } => {
            let vault = open_vault(resolve_paths(args.dir)?)?;
            let account = vault.store().get_account(id)?;
            let fields = vault.store().custom_fields_for(id)?;

            println!("Title:     {}", account.title());
            println!("User name: {}", account.user_name());
            if copy {
                println!("Password:  ********");
            } else {
                println!("Password:  {}", account.password());
            }
            if let Some(url) = account.url() {
                println!("URL:       {url}");
            }
            if let Some(notes) = account.notes() {
                println!("Notes:     {notes}");
            }
            if let Some(date) = account.expiration_date() {
                println!("Expires:   {date}{}", expiry_marker(&account));
            }
            println!("Created:   {}", account.creation_date().format("%Y-%m-%d %H:%M"));
            println!(
                "Modified:  {}",
                account.last_modification_date().format("%Y-%m-%d %H:%M")
            );
            for field in &fields {
                println!("  [{}] {} = {}", field.id(), field.name(), field.value());
            }

            if copy {
                copy_to_clipboard(account.password())?;
            }
        }
        Commands::Update {
            id,
            title,
            user_name,
            password,
            extra,
        } => {
            let mut vault = open_vault(resolve_paths(args.dir)?)?;
            let account = vault.store_mut().update_account(
                id,
                AccountUpdate {
                    title,
                    user_name,
                    password,
                    url: extra.url,
                    notes: extra.notes,
                    expiration_date: extra.expires,
                },
            )?;
            println!("account {} updated", account.id());
        }
        Commands::Remove { id } => {
            let mut vault = open_vault(resolve_paths(args.dir)?)?;
            vault.store_mut().delete_account(id)?;
            println!("account {id} removed successfully");
        }
        Commands::Field(cmd) => {
            let mut vault = open_vault(resolve_paths(args.dir)?)?;
            let store = vault.store_mut();
            match cmd {
                FieldCommands::Add {
                    account_id,
                    name,
                    value,
                } => {
                    let field =
                        store.create_custom_field(NewCustomField::new(account_id, name, value))?;
                    println!("stored field '{}' (id {})", field.name(), field.id());
                }
                FieldCommands::Update { id, name, value } => {
                    store.update_custom_field(id, CustomFieldUpdate { name, value })?;
                    println!("field {id} updated");
                }
                FieldCommands::Remove { id } => {
                    store.delete_custom_field(id)?;
                    println!("field {id} removed successfully");
                }
            }
        }
        Commands::Generate {
            length,
            no_digits,
            no_uppercase,
            no_special,
        } => {
            let password = generate_password(
                length,
                PasswordPolicy {
                    digits: !no_digits,
                    uppercase: !no_uppercase,
                    special: !no_special,
                },
            )?;
            println!("{}", *password);
        }
        Commands::Strength { password } => {
            println!("{}", check_password_strength(&password));
        }
    }

    Ok(())
}

fn expiry_marker(account: &Account) -> &'static str {
    match account.expiry_status(Local::now().date_naive()) {
        ExpiryStatus::Expired => " (expired)",
        ExpiryStatus::ExpiringSoon => " (expires soon)",
        ExpiryStatus::Valid | ExpiryStatus::NoExpiry => "",
    }
}

fn print_account_table(accounts: &[Account]) {
    let width = |header: &str, cell: &dyn Fn(&Account) -> usize| {
        accounts
            .iter()
            .map(cell)
            .chain(std::iter::once(header.len()))
            .max()
            .unwrap_or(header.len())
    };

    let id_w = width("ID", &|a| a.id().to_string().len());
    let title_w = width("Title", &|a| a.title().chars().count());
    let user_w = width("User", &|a| a.user_name().chars().count());
    let url_w = width("URL", &|a| a.url().map_or(0, |u| u.chars().count()));

    println!(
        "{:<id_w$}  {:<title_w$}  {:<user_w$}  {:<url_w$}  Expires",
        "ID", "Title", "User", "URL"
    );
    println!(
        "{:-<id_w$}  {:-<title_w$}  {:-<user_w$}  {:-<url_w$}  {:-<7}",
        "", "", "", "", ""
    );

    for a in accounts {
        let expires = a
            .expiration_date()
            .map(|d| format!("{d}{}", expiry_marker(a)))
            .unwrap_or_default();
        println!(
            "{:<id_w$}  {:<title_w$}  {:<user_w$}  {:<url_w$}  {}",
            a.id(),
            a.title(),
            a.user_name(),
            a.url().unwrap_or(""),
            expires
        );
    }
}

/// Copies `secret` and clears the clipboard again after a delay or on Ctrl-C.
fn copy_to_clipboard(secret: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
    clipboard
        .set_text(secret.to_owned())
        .context("failed to copy to clipboard")?;

    ctrlc::set_handler(|| {
        if let Ok(mut clipboard) = arboard::Clipboard::new() {
            let _ = clipboard.clear();
        }
        std::process::exit(130);
    })
    .context("failed to install Ctrl-C handler")?;

    println!(
        "password copied; clipboard clears in {} seconds",
        CLIPBOARD_CLEAR_AFTER.as_secs()
    );
    thread::sleep(CLIPBOARD_CLEAR_AFTER);

    // leave the clipboard alone if the user has copied something else since
    let unchanged = clipboard.get_text().map(Zeroizing::new).is_ok_and(|t| *t == secret);
    if unchanged {
        clipboard.clear().context("failed to clear clipboard")?;
    }
    Ok(())
}
