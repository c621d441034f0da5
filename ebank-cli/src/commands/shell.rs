//! Shell command - interactive banking session
//!
//! Three kinds of thread meet here. The input thread reads lines and turns
//! them into commands. The bank (or the push endpoint) delivers incoming
//! transfers on threads of its own. Everything is funneled into one channel
//! and handled on the main thread, which is the only thread that runs
//! session operations or prints events.

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use super::{get_context, get_logger};
use crate::output;
use ebank_core::services::{record_quietly, BankSession, ChannelSubscriber, Diagnostic, EntryPoint};
use ebank_core::{BankClientContext, Error, EventKind, RecordedEvent, SessionState};

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Login { account: String, password: Option<String> },
    Balance,
    Deposit(i64),
    Withdraw(i64),
    Transfer { to: String, amount: i64 },
    History,
    Simulate { from: String, amount: i64 },
    Logout,
    Help,
    Quit,
    Empty,
    Invalid(String),
}

impl ShellCommand {
    fn name(&self) -> &'static str {
        match self {
            ShellCommand::Login { .. } => "login",
            ShellCommand::Balance => "balance",
            ShellCommand::Deposit(_) => "deposit",
            ShellCommand::Withdraw(_) => "withdraw",
            ShellCommand::Transfer { .. } => "transfer",
            ShellCommand::History => "history",
            ShellCommand::Simulate { .. } => "simulate",
            ShellCommand::Logout => "logout",
            ShellCommand::Help => "help",
            ShellCommand::Quit => "quit",
            ShellCommand::Empty => "",
            ShellCommand::Invalid(_) => "invalid",
        }
    }

    /// Commands that block on the bank
    fn is_remote(&self) -> bool {
        matches!(
            self,
            ShellCommand::Login { .. }
                | ShellCommand::Balance
                | ShellCommand::Deposit(_)
                | ShellCommand::Withdraw(_)
                | ShellCommand::Transfer { .. }
        )
    }
}

fn parse_amount(raw: Option<&str>) -> std::result::Result<i64, String> {
    let raw = raw.ok_or_else(|| "Amount is required".to_string())?;
    raw.replace(['_', ','], "")
        .parse::<i64>()
        .map_err(|_| format!("Invalid amount: {}", raw))
}

pub fn parse_command(line: &str) -> ShellCommand {
    let mut parts = line.split_whitespace();
    let Some(word) = parts.next() else {
        return ShellCommand::Empty;
    };
    let args: Vec<&str> = parts.collect();

    let amount_command = |build: fn(i64) -> ShellCommand| match parse_amount(args.first().copied()) {
        Ok(amount) => build(amount),
        Err(msg) => ShellCommand::Invalid(msg),
    };

    match word.to_lowercase().as_str() {
        "login" => match args.as_slice() {
            [account] => ShellCommand::Login {
                account: account.to_string(),
                password: None,
            },
            [account, password] => ShellCommand::Login {
                account: account.to_string(),
                password: Some(password.to_string()),
            },
            _ => ShellCommand::Invalid("Usage: login <account> [password]".to_string()),
        },
        "balance" | "bal" => ShellCommand::Balance,
        "deposit" => amount_command(ShellCommand::Deposit),
        "withdraw" => amount_command(ShellCommand::Withdraw),
        "transfer" => match args.as_slice() {
            [to, amount] => match parse_amount(Some(*amount)) {
                Ok(amount) => ShellCommand::Transfer {
                    to: to.to_string(),
                    amount,
                },
                Err(msg) => ShellCommand::Invalid(msg),
            },
            _ => ShellCommand::Invalid("Usage: transfer <account> <amount>".to_string()),
        },
        "history" => ShellCommand::History,
        "simulate" => match args.as_slice() {
            [from, amount] => match parse_amount(Some(*amount)) {
                Ok(amount) => ShellCommand::Simulate {
                    from: from.to_string(),
                    amount,
                },
                Err(msg) => ShellCommand::Invalid(msg),
            },
            _ => ShellCommand::Invalid("Usage: simulate <from-account> <amount>".to_string()),
        },
        "logout" => ShellCommand::Logout,
        "help" | "?" => ShellCommand::Help,
        "quit" | "exit" => ShellCommand::Quit,
        other => ShellCommand::Invalid(format!("Unknown command '{}'. Type 'help'.", other)),
    }
}

enum UiMessage {
    Input(ShellCommand),
    Event(RecordedEvent),
    InputClosed,
}

impl From<RecordedEvent> for UiMessage {
    fn from(event: RecordedEvent) -> Self {
        UiMessage::Event(event)
    }
}

/// Ask for a password on the terminal; not possible when input is piped
fn prompt_password(account: &str) -> std::result::Result<String, String> {
    if atty::isnt(atty::Stream::Stdin) {
        return Err("Password is required when input is not a terminal".to_string());
    }
    dialoguer::Password::new()
        .with_prompt(format!("Password for {}", account))
        .interact()
        .map_err(|e| format!("Could not read password: {}", e))
}

fn spawn_input_thread(tx: Sender<UiMessage>) -> io::Result<()> {
    thread::Builder::new().name("shell-input".to_string()).spawn(move || {
        loop {
            let mut line = String::new();
            match io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => {
                    let _ = tx.send(UiMessage::InputClosed);
                    return;
                }
                Ok(_) => {}
            }

            let command = match parse_command(&line) {
                ShellCommand::Login {
                    account,
                    password: None,
                } => match prompt_password(&account) {
                    Ok(password) => ShellCommand::Login {
                        account,
                        password: Some(password),
                    },
                    Err(msg) => ShellCommand::Invalid(msg),
                },
                command => command,
            };

            let quit = command == ShellCommand::Quit;
            if tx.send(UiMessage::Input(command)).is_err() || quit {
                return;
            }
        }
    })?;
    Ok(())
}

fn render_event(recorded: &RecordedEvent) {
    let event = &recorded.event;
    let time = event
        .occurred_at
        .with_timezone(&Local)
        .format("%H:%M:%S")
        .to_string();
    let amount = if event.amount != 0 {
        output::format_amount(event.amount)
    } else {
        String::new()
    };
    let line = format!(
        "{:<12} {:<30} {:>12}   balance {}",
        event.kind.as_str(),
        event.detail,
        amount,
        output::format_amount(event.balance_after)
    );
    let line = match event.kind {
        EventKind::Error => line.red(),
        EventKind::TransferIn => line.green().bold(),
        EventKind::Login => line.cyan(),
        _ => line.normal(),
    };
    println!("\r{} {}", time.dimmed(), line);
}

fn print_prompt() {
    print!("{} ", "ebank>".bold());
    let _ = io::stdout().flush();
}

fn print_help(demo: bool) {
    println!("{}", "Commands".bold());
    println!("  login <account> [password]   Log in (password is prompted if omitted)");
    println!("  balance                      Query the current balance");
    println!("  deposit <amount>             Deposit money");
    println!("  withdraw <amount>            Withdraw money");
    println!("  transfer <account> <amount>  Transfer to another account");
    println!("  history                      Show this session's events");
    if demo {
        println!("  simulate <account> <amount>  Have another account send you money");
    }
    println!("  logout                       End the session");
    println!("  quit                         Leave the shell");
}

struct Shell {
    ctx: BankClientContext,
    session: BankSession,
    /// Events of the last session that ended, kept for `history`
    previous: Vec<RecordedEvent>,
    tx: Sender<UiMessage>,
    interactive: bool,
}

impl Shell {
    fn new(ctx: BankClientContext, tx: Sender<UiMessage>) -> Result<Self> {
        let session = ctx.new_session()?;
        let shell = Self {
            ctx,
            session,
            previous: Vec::new(),
            tx,
            interactive: atty::is(atty::Stream::Stdout),
        };
        shell.subscribe();
        Ok(shell)
    }

    fn subscribe(&self) {
        let subscriber = ChannelSubscriber::new("shell", self.tx.clone());
        // A fresh session has no history yet
        let _ = self.session.sink().subscribe(Box::new(subscriber));
    }

    /// Replace a finished session with a fresh, unauthenticated one
    fn restart_session(&mut self) -> Result<()> {
        self.session.logout();
        let ended = self.session.history();
        if !ended.is_empty() {
            self.previous = ended;
        }
        self.session = self.ctx.new_session()?;
        self.subscribe();
        Ok(())
    }

    fn with_spinner<T>(&mut self, message: &str, f: impl FnOnce(&mut BankSession) -> T) -> T {
        let spinner = self.interactive.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.set_message(message.to_string());
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        });

        let result = f(&mut self.session);

        if let Some(pb) = spinner {
            pb.finish_and_clear();
        }
        result
    }

    /// Run one command; returns false when the shell should exit
    fn execute(&mut self, command: ShellCommand) -> Result<bool> {
        let name = command.name();
        let remote = command.is_remote();

        let outcome = match command {
            ShellCommand::Empty => return Ok(true),
            ShellCommand::Quit => return Ok(false),
            ShellCommand::Invalid(msg) => {
                output::error(&msg);
                return Ok(true);
            }
            ShellCommand::Help => {
                print_help(self.ctx.demo_bank.is_some());
                return Ok(true);
            }
            ShellCommand::History => {
                self.print_history();
                return Ok(true);
            }
            ShellCommand::Simulate { from, amount } => {
                self.simulate(&from, amount);
                return Ok(true);
            }
            ShellCommand::Logout => {
                if self.session.is_authenticated() {
                    self.restart_session()?;
                    output::success("Logged out");
                } else {
                    output::warning("Not logged in");
                }
                return Ok(true);
            }
            ShellCommand::Login { account, password } => {
                if self.session.is_authenticated() {
                    output::warning("Already logged in. Use 'logout' first.");
                    return Ok(true);
                }
                let password = password.unwrap_or_default();
                self.with_spinner("Logging in...", |s| s.login(&account, &password).map(drop))
            }
            ShellCommand::Balance => {
                self.with_spinner("Querying balance...", |s| s.query_balance().map(drop))
            }
            ShellCommand::Deposit(amount) => {
                self.with_spinner("Depositing...", |s| s.deposit(amount).map(drop))
            }
            ShellCommand::Withdraw(amount) => {
                self.with_spinner("Withdrawing...", |s| s.withdraw(amount).map(drop))
            }
            ShellCommand::Transfer { to, amount } => {
                self.with_spinner("Transferring...", |s| s.transfer(&to, amount).map(drop))
            }
        };

        if remote {
            record_quietly(
                self.ctx.diagnostics.as_deref(),
                Diagnostic::CommandExecuted { command: name },
            );
        }

        // Every other failure was recorded as an Error event and renders as one
        match outcome {
            Err(Error::NotAuthenticated) => output::warning("Not logged in. Use: login <account>"),
            Err(Error::SessionClosed) => output::warning("Session is closed"),
            _ => {}
        }

        if self.session.state() == SessionState::Closed {
            output::warning("Connection to the bank was lost. Log in again.");
            self.restart_session()?;
        }
        Ok(true)
    }

    fn simulate(&self, from: &str, amount: i64) {
        let Some(bank) = &self.ctx.demo_bank else {
            output::warning("simulate is only available in demo mode");
            return;
        };
        let Some(account) = self.session.account_id() else {
            output::warning("Not logged in");
            return;
        };
        if let Err(e) = bank.simulate_incoming(from, account.as_str(), amount) {
            output::error(&e.detail());
        }
    }

    fn print_history(&self) {
        let current = self.session.history();
        if current.is_empty() && self.previous.is_empty() {
            println!("No events yet.");
            return;
        }

        if !self.previous.is_empty() {
            println!("{}", "Previous session".bold());
            print_events(&self.previous);
        }
        if !current.is_empty() {
            println!("{}", "Current session".bold());
            print_events(&current);
        }
    }
}

fn print_events(history: &[RecordedEvent]) {
    let mut table = output::create_table();
    table.set_header(vec!["#", "Time", "Type", "Detail", "Amount", "Balance"]);
    for recorded in history {
        let event = &recorded.event;
        table.add_row(vec![
            recorded.sequence.to_string(),
            event
                .occurred_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
            event.kind.as_str().to_string(),
            event.detail.clone(),
            output::format_amount(event.amount),
            output::format_amount(event.balance_after),
        ]);
    }
    println!("{}", table);
}

fn next_message(pending: &mut VecDeque<UiMessage>, rx: &Receiver<UiMessage>) -> Option<UiMessage> {
    pending.pop_front().or_else(|| rx.recv().ok())
}

pub fn run() -> Result<()> {
    let logger = get_logger(EntryPoint::Shell);
    let ctx = get_context(logger)?;
    let demo = ctx.demo_bank.is_some();

    let (tx, rx) = mpsc::channel();
    let mut shell = Shell::new(ctx, tx.clone())?;
    spawn_input_thread(tx).context("Failed to start input reader")?;

    println!("{}", "eBank shell".bold());
    if demo {
        output::warning("Demo mode: accounts 1001, 1002, 1003 (password 123456)");
    }
    output::info("Type 'help' for commands.");
    print_prompt();

    let mut pending = VecDeque::new();
    while let Some(message) = next_message(&mut pending, &rx) {
        match message {
            UiMessage::Event(event) => {
                render_event(&event);
                print_prompt();
            }
            UiMessage::InputClosed => break,
            UiMessage::Input(command) => {
                if !shell.execute(command)? {
                    break;
                }
                // Events produced by the command render before the next prompt
                for message in rx.try_iter() {
                    match message {
                        UiMessage::Event(event) => render_event(&event),
                        other => pending.push_back(other),
                    }
                }
                print_prompt();
            }
        }
    }

    shell.session.logout();
    println!();
    Ok(())
}
