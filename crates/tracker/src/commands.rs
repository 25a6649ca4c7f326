//! Operator command surface over Telegram messages. Only the single
//! allow-listed chat is listened to; everything else is dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use common::types::TrackedWallet;

use crate::engine::TrackerContext;
use crate::notifier::profile_url;
use crate::telegram::TelegramClient;

const HELP_TEXT: &str = "\u{1f4e1} *Polymarket wallet tracker*\n\n\
    /add <address> <name> \u{2014} track a wallet\n\
    /remove <address or name> \u{2014} stop tracking\n\
    /list \u{2014} show tracked wallets\n\
    /help \u{2014} this message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add { address: String, name: String },
    Remove { query: String },
    List,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Usage(&'static str),
}

/// Parse a message text. `None` means the text is not a command for
/// this bot at all and should be ignored silently.
pub fn parse(text: &str) -> Option<Result<Command, CommandError>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let verb = parts.next()?;
    // Group chats suffix commands with the bot handle.
    let verb = verb.split('@').next().unwrap_or(verb);

    match verb {
        "start" => Some(Ok(Command::Start)),
        "help" => Some(Ok(Command::Help)),
        "list" => Some(Ok(Command::List)),
        "add" => {
            let Some(address) = parts.next() else {
                return Some(Err(CommandError::Usage("Usage: /add <address> <name>")));
            };
            let name: Vec<&str> = parts.collect();
            if name.is_empty() {
                return Some(Err(CommandError::Usage("Usage: /add <address> <name>")));
            }
            Some(Ok(Command::Add {
                address: address.to_string(),
                name: name.join(" "),
            }))
        }
        "remove" => {
            let query: Vec<&str> = parts.collect();
            if query.is_empty() {
                return Some(Err(CommandError::Usage(
                    "Usage: /remove <address or name>",
                )));
            }
            Some(Ok(Command::Remove {
                query: query.join(" "),
            }))
        }
        _ => None,
    }
}

/// Shape check only; the chain is the authority on whether the
/// address exists.
pub fn validate_address(address: &str) -> bool {
    address.starts_with("0x") && address.len() >= 10
}

pub async fn run_command_loop(
    ctx: Arc<TrackerContext>,
    telegram: Arc<TelegramClient>,
    chat_id: i64,
    poll_timeout_secs: u64,
    cancel: CancellationToken,
) {
    if let Err(err) = telegram
        .set_my_commands(&[
            ("start", "Show usage"),
            ("help", "Show usage"),
            ("add", "Track a wallet: /add <address> <name>"),
            ("remove", "Stop tracking: /remove <address or name>"),
            ("list", "List tracked wallets"),
        ])
        .await
    {
        warn!(error = %err, "failed to register command menu");
    }

    info!("command loop started");
    let mut offset = 0i64;
    loop {
        let updates = tokio::select! {
            _ = cancel.cancelled() => {
                info!("command loop stopping");
                return;
            }
            result = telegram.get_updates(offset, poll_timeout_secs) => match result {
                Ok(updates) => updates,
                Err(err) => {
                    warn!(error = %err, "getUpdates failed, backing off");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    continue;
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id != chat_id {
                debug!(chat = message.chat.id, "ignoring message from unknown chat");
                continue;
            }
            let Some(text) = message.text else { continue };
            match parse(&text) {
                Some(Ok(command)) => handle_command(&ctx, command).await,
                Some(Err(CommandError::Usage(usage))) => ctx.notifier.reply(usage).await,
                None => {}
            }
        }
    }
}

async fn handle_command(ctx: &TrackerContext, command: Command) {
    match command {
        Command::Start | Command::Help => ctx.notifier.reply(HELP_TEXT).await,
        Command::Add { address, name } => handle_add(ctx, address, name).await,
        Command::Remove { query } => handle_remove(ctx, &query).await,
        Command::List => handle_list(ctx).await,
    }
}

async fn handle_add(ctx: &TrackerContext, address: String, name: String) {
    if !validate_address(&address) {
        ctx.notifier
            .reply("\u{274c} That does not look like a wallet address (expected 0x...).")
            .await;
        return;
    }

    let wallet = TrackedWallet {
        address: address.clone(),
        name: name.clone(),
    };
    if let Err(err) = ctx.db.upsert_wallet(wallet).await {
        warn!(wallet = %address, error = %err, "failed to store wallet");
        ctx.notifier
            .reply("\u{274c} Could not store the wallet, try again.")
            .await;
        return;
    }

    // Seed silently so existing positions do not fire notifications.
    // A failed seed keeps the wallet with an empty snapshot; its open
    // positions will then show up as new on the next good cycle.
    match ctx.seed_wallet(&address).await {
        Ok(count) => {
            info!(wallet = %address, positions = count, "wallet added");
            ctx.notifier
                .reply(&format!(
                    "\u{2705} Now tracking *{name}* with {count} open positions."
                ))
                .await;
        }
        Err(err) => {
            warn!(wallet = %address, error = %err, "initial seed fetch failed");
            ctx.notifier
                .reply(&format!(
                    "\u{26a0} Added *{name}*, but the initial position fetch failed. \
                     Existing positions will be reported as new once the API recovers."
                ))
                .await;
        }
    }
}

async fn handle_remove(ctx: &TrackerContext, query: &str) {
    let found = match ctx.db.find_wallet(query).await {
        Ok(found) => found,
        Err(err) => {
            warn!(error = %err, "wallet lookup failed");
            ctx.notifier.reply("\u{274c} Lookup failed, try again.").await;
            return;
        }
    };
    let Some(wallet) = found else {
        ctx.notifier
            .reply(&format!("\u{2753} No tracked wallet matches `{query}`."))
            .await;
        return;
    };

    match ctx.db.remove_wallet(&wallet.address).await {
        Ok(true) => {
            ctx.debounce.clear_wallet(&wallet.address);
            info!(wallet = %wallet.address, "wallet removed");
            ctx.notifier
                .reply(&format!("\u{1f5d1} Stopped tracking *{}*.", wallet.name))
                .await;
        }
        Ok(false) => {
            ctx.notifier
                .reply(&format!("\u{2753} No tracked wallet matches `{query}`."))
                .await;
        }
        Err(err) => {
            warn!(wallet = %wallet.address, error = %err, "failed to remove wallet");
            ctx.notifier.reply("\u{274c} Removal failed, try again.").await;
        }
    }
}

async fn handle_list(ctx: &TrackerContext) {
    let wallets = match ctx.db.list_wallets().await {
        Ok(wallets) => wallets,
        Err(err) => {
            warn!(error = %err, "failed to list wallets");
            ctx.notifier.reply("\u{274c} Listing failed, try again.").await;
            return;
        }
    };
    if wallets.is_empty() {
        ctx.notifier
            .reply("No wallets tracked yet. Use /add <address> <name>.")
            .await;
        return;
    }
    let mut lines = vec![format!("\u{1f4cb} *Tracked wallets ({}):*", wallets.len())];
    for w in wallets {
        lines.push(format!(
            "\u{2022} [{}]({}) `{}`",
            w.name.replace('_', " "),
            profile_url(&w.address),
            w.address
        ));
    }
    ctx.notifier.reply(&lines.join("\n")).await;
}
