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

use std::{
    fs,
    io::{self, Write},
};

use fatbox_fs::{DirEntryType, FatError, FatFs, Result};

const BLUE: &str = "\x1b[34m";
const RESET: &str = "\x1b[0m";

/// Runs one shell command. Unknown names are reported but not an error,
/// so a typo does not abort a scripted `run`.
pub fn dispatch(fs: &mut FatFs, args: &[String]) -> Result<()> {
    let Some((name, args)) = args.split_first() else {
        return Ok(());
    };
    match name.as_str() {
        "cd" => fs.dir_change(arg(args, 0)?),
        "pwd" => {
            println!("{}", fs.current_directory());
            Ok(())
        }
        "ls" => ls(fs, args),
        "mkdir" => fs.dir_create(arg(args, 0)?),
        "rmdir" => fs.dir_erase(arg(args, 0)?),
        "touch" => fs.file_create(arg(args, 0)?),
        "cat" => cat(fs, arg(args, 0)?),
        "rm" => fs.file_erase(arg(args, 0)?),
        "mv" => fs.file_move(arg(args, 0)?, arg(args, 1)?),
        "cp" => fs.file_copy(arg(args, 0)?, arg(args, 1)?),
        "size" => size(fs, args.first().map(String::as_str).unwrap_or("/")),
        "free" => {
            let free_blocks = fs.free_blocks();
            println!(
                "{free_blocks} free blocks ({} bytes)",
                free_blocks as usize * fs.block_size()
            );
            Ok(())
        }
        "import" => import(fs, arg(args, 0)?, arg(args, 1)?),
        "append" => append(fs, args),
        _ => {
            println!("Unknown command: {name}");
            Ok(())
        }
    }
}

/// Paths and other mandatory arguments; a missing one is an invalid path,
/// which is what every command here takes.
fn arg(args: &[String], index: usize) -> Result<&str> {
    args.get(index).map(String::as_str).ok_or(FatError::InvalidPath)
}

#[derive(Debug, Default, PartialEq, Eq)]
struct LsOptions<'a> {
    all: bool,
    long: bool,
    path: Option<&'a str>,
}

impl<'a> LsOptions<'a> {
    fn parse(args: &'a [String]) -> Result<Self> {
        let mut options = Self::default();
        for argument in args {
            if argument == "--all" {
                options.all = true;
            } else if argument.starts_with("--") {
                return Err(FatError::LsInvalidArgument);
            } else if let Some(flags) = argument.strip_prefix('-') {
                for flag in flags.chars() {
                    match flag {
                        'a' => options.all = true,
                        'l' => options.long = true,
                        _ => return Err(FatError::LsInvalidArgument),
                    }
                }
            } else {
                options.path = Some(argument.as_str());
            }
        }
        Ok(options)
    }
}

fn ls(fs: &FatFs, args: &[String]) -> Result<()> {
    let LsOptions { all, long, path } = LsOptions::parse(args)?;

    let mut dir = fs.dir_open(path.unwrap_or(fs.current_directory()))?;
    if all {
        // the tree has no literal dot entries; show them for familiarity
        entry_line(".", true, long);
        entry_line("..", true, long);
    }
    loop {
        match fs.dir_list(&mut dir) {
            Ok(entry) => entry_line(
                &entry.name,
                entry.kind == DirEntryType::Directory,
                long,
            ),
            Err(FatError::EndOfDir) => break,
            Err(err) => return Err(err),
        }
    }
    if !long {
        println!();
    }
    Ok(())
}

fn entry_line(name: &str, is_directory: bool, long: bool) {
    if is_directory {
        print!("{BLUE}{name}{RESET}   ");
    } else {
        print!("{name}   ");
    }
    if long {
        println!();
    }
}

fn cat(fs: &mut FatFs, path: &str) -> Result<()> {
    let mut handle = fs.file_open(path, "r")?;
    let stdout = io::stdout();
    let mut stdout = stdout.lock();
    let mut chunk = [0u8; 128];
    loop {
        let read = fs.file_read(&mut handle, &mut chunk)?;
        if read == 0 {
            break;
        }
        stdout
            .write_all(&chunk[..read])
            .map_err(|_| FatError::FatBufferError)?;
    }
    println!();
    Ok(())
}

fn size(fs: &FatFs, path: &str) -> Result<()> {
    let (bytes, blocks) = fs.file_size(path)?;
    println!("{bytes} bytes in {blocks} blocks");
    Ok(())
}

/// Streams a host file into the image, creating or overwriting `path`.
fn import(fs: &mut FatFs, host_path: &str, path: &str) -> Result<()> {
    let content = fs::read(host_path).map_err(|err| {
        eprintln!("Cannot read {host_path}: {err}");
        FatError::FatBufferError
    })?;
    if content.len() > (fs.free_blocks() as usize).saturating_sub(2) * fs.block_size() {
        return Err(FatError::NoFreeBlocks);
    }

    let mut handle = fs.file_open(path, "w+")?;
    for chunk in content.chunks(128) {
        fs.file_write(&mut handle, chunk)?;
    }
    Ok(())
}

fn append(fs: &mut FatFs, args: &[String]) -> Result<()> {
    let path = arg(args, 0)?;
    let text = arg(args, 1)?;
    let count: usize = args
        .get(2)
        .and_then(|n| n.parse().ok())
        .unwrap_or(1);

    let mut handle = fs.file_open(path, "a")?;
    for _ in 0..count {
        fs.file_write(&mut handle, text.as_bytes())?;
    }
    Ok(())
}
