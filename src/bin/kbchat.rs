//! Interactive chat with a knowledge-base service.
//!
//! # Usage
//!
//! ```bash
//! # Talk to the service on localhost
//! kbchat
//!
//! # Point at another deployment and keep credentials between runs
//! kbchat --base-url https://kb.example.com/api/ --credentials ~/.kbchat.json
//!
//! # Answer without searching the knowledge base, no colors
//! kbchat --no-rag --no-color
//! ```
//!
//! # Commands
//!
//! - `/login <user> <password>` - Log in
//! - `/rag on|off` - Toggle knowledge-base retrieval
//! - `/status` - Show login state and session statistics
//! - `/help` - Show every command
//! - `/quit` - Exit the application

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use kbchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, PlainTextRenderer, Renderer, help_text,
    parse_command,
};
use kbchat::telemetry;

/// Main entry point for the kbchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::init_tracing()?;
    let (args, _) = ChatArgs::from_command_line_relaxed("kbchat [OPTIONS]");
    let config = ChatConfig::from_args(args)?;
    let use_color = config.use_color;

    let mut session = ChatSession::from_config(config)?;
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut renderer = PlainTextRenderer::with_color(use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("Knowledge base chat ({})", session.client().base_url());
    if session.is_authenticated() {
        println!("Logged in. Type /help for commands, /quit to exit\n");
    } else {
        println!("Not logged in. Use /login <user> <password>, /help for commands\n");
    }

    loop {
        interrupted.store(false, Ordering::Relaxed);

        match rl.readline("You: ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.clear();
                            renderer.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Rag(enabled) => {
                            session.set_rag(enabled);
                            if enabled {
                                renderer.print_info("Knowledge-base retrieval enabled.");
                            } else {
                                renderer.print_info("Knowledge-base retrieval disabled.");
                            }
                        }
                        ChatCommand::Login { username, password } => {
                            match session.login(&username, &password).await {
                                Ok(name) => renderer.print_info(&format!("Logged in as {name}.")),
                                Err(err) => renderer.print_error(&format!("Login failed: {err}")),
                            }
                        }
                        ChatCommand::Register {
                            username,
                            email,
                            password,
                        } => match session.register(&username, &email, &password).await {
                            Ok(message) if message.is_empty() => renderer
                                .print_info("Account created. Use /login to sign in."),
                            Ok(message) => renderer.print_info(&message),
                            Err(err) => {
                                renderer.print_error(&format!("Registration failed: {err}"))
                            }
                        },
                        ChatCommand::Logout => {
                            session.logout().await;
                            renderer.print_info("Logged out.");
                        }
                        ChatCommand::TranscriptPath(path) => {
                            session.set_transcript_path(Some(PathBuf::from(&path)));
                            renderer.print_info(&format!("Transcript auto-save set to {}", path));
                        }
                        ChatCommand::ClearTranscriptPath => {
                            session.set_transcript_path(None);
                            renderer.print_info("Transcript auto-save disabled.");
                        }
                        ChatCommand::SaveTranscript(path) => {
                            match session.save_transcript_to(&path) {
                                Ok(_) => {
                                    renderer.print_info(&format!("Transcript saved to {}", path))
                                }
                                Err(err) => renderer
                                    .print_error(&format!("Failed to save transcript: {}", err)),
                            }
                        }
                        ChatCommand::LoadTranscript(path) => {
                            match session.load_transcript_from(&path) {
                                Ok(_) => {
                                    renderer.print_info(&format!("Transcript loaded from {}", path))
                                }
                                Err(err) => renderer
                                    .print_error(&format!("Failed to load transcript: {}", err)),
                            }
                        }
                        ChatCommand::Status => {
                            print_stats(&session);
                        }
                        ChatCommand::ShowConfig => {
                            print_config(&session);
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                println!("Assistant:");
                if let Err(e) = session.send(line, &mut renderer).await {
                    renderer.print_error(&e.to_string());
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn print_stats(session: &ChatSession) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!(
        "      Logged in: {}",
        if stats.authenticated { "yes" } else { "no" }
    );
    println!("      Messages: {}", stats.message_count);
    println!("      Answers: {}", stats.turn_count);
    println!("      Retrieval: {}", on_off(stats.use_rag));
    match stats.transcript_path {
        Some(ref path) => println!("      Transcript file: {}", path.display()),
        None => println!("      Transcript file: (disabled)"),
    }
}

fn print_config(session: &ChatSession) {
    let stats = session.stats();
    let config = session.config();
    println!("    Current Configuration:");
    println!("      Base URL: {}", stats.base_url);
    println!("      Retrieval: {}", on_off(stats.use_rag));
    println!("      Colors: {}", on_off(config.use_color));
    match config.timeout {
        Some(timeout) => println!("      Timeout: {}s", timeout.as_secs()),
        None => println!("      Timeout: (none)"),
    }
    match stats.credentials_path {
        Some(ref path) => println!("      Credentials file: {}", path.display()),
        None => println!("      Credentials file: (memory only)"),
    }
    match stats.transcript_path {
        Some(ref path) => println!("      Transcript file: {}", path.display()),
        None => println!("      Transcript file: (disabled)"),
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}
