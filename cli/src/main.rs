// Copyright 2024 Kevin Ludwig
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Thin driver over the fatbox core: create images, run one command, or
//! stay in an interactive shell. All the actual work happens in
//! `fatbox_fs`; this binary only parses arguments and renders results.

use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
    process::ExitCode,
};

use clap::{Parser, Subcommand};

use fatbox_fs::{FatFs, Result};

mod commands;

#[derive(Parser)]
#[command(name = "fatbox", version, about = "Manage FAT-style file system images")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new image file
    Init {
        image: PathBuf,
        /// Number of blocks, a positive multiple of 32
        #[arg(long)]
        blocks: u32,
        /// Bytes per block, a positive multiple of 32
        #[arg(long)]
        block_size: u32,
    },
    /// Open an image in an interactive shell
    Shell { image: PathBuf },
    /// Run a single shell command against an image
    Run {
        image: PathBuf,
        /// The command and its arguments, e.g. `ls -l /`
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Init {
            image,
            blocks,
            block_size,
        } => {
            FatFs::init(&image, block_size, blocks)?;
            println!(
                "Initialized {} with {blocks} blocks of {block_size} bytes",
                image.display()
            );
            Ok(())
        }
        Command::Shell { image } => shell(FatFs::open(&image)?),
        Command::Run { image, command } => {
            let mut fs = FatFs::open(&image)?;
            let result = commands::dispatch(&mut fs, &command);
            fs.close()?;
            result
        }
    }
}

fn shell(mut fs: FatFs) -> Result<()> {
    println!("fatbox shell. Type 'help' for the command list, 'exit' to quit.");

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{}> ", fs.current_directory());
        if io::stdout().flush().is_err() {
            break;
        }

        line.clear();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let args: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let Some(name) = args.first() else { continue };

        match name.as_str() {
            "exit" | "quit" => break,
            "help" => help(),
            _ => {
                // errors keep the shell alive
                if let Err(err) = commands::dispatch(&mut fs, &args) {
                    println!("{name} error: {err}");
                }
            }
        }
    }

    fs.close()
}

fn help() {
    println!(
        "Commands:
  cd <path>                  change the current directory
  ls [-l] [-a] [path]        list a directory
  mkdir <path>               create a directory
  rmdir <path>               erase a directory and its contents
  touch <path>               create an empty file
  cat <path>                 print a file
  rm <path>                  erase a file
  mv <src> <dst>             move or rename a file or directory
  cp <src> <dst>             copy a file or directory
  size [path]                show the size of a file or directory
  free                       show the free space
  import <host-file> <path>  copy a host file into the image
  append <path> <text> [n]   append text to a file n times
  help                       this list
  exit                       leave the shell"
    );
}
