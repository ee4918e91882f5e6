mod block_file;
mod commands;
mod logger;

use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use std::fs;
use std::io;
use std::path::Path;

pub fn main() {
    if let Err(err) = logger::init() {
        eprintln!("fat-fs-fuse: {}", err);
    }
    if let Err(err) = fs_tool() {
        eprintln!("fat-fs-fuse: {}", err);
        std::process::exit(1);
    }
}

fn image_arg() -> Arg<'static, 'static> {
    Arg::with_name("image")
        .required(true)
        .help("Disk image file")
}

fn name_arg() -> Arg<'static, 'static> {
    Arg::with_name("name")
        .required(true)
        .help("File name inside the image")
}

fn value<'a>(matches: &'a ArgMatches, name: &str) -> io::Result<&'a str> {
    matches.value_of(name).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("missing argument <{}>", name),
        )
    })
}

fn fs_tool() -> io::Result<()> {
    let matches = App::new("fat-fs image tool")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .subcommand(
            SubCommand::with_name("make")
                .about("Create an empty disk image")
                .arg(image_arg())
                .arg(
                    Arg::with_name("data_blocks")
                        .required(true)
                        .help("Number of data blocks"),
                ),
        )
        .subcommand(
            SubCommand::with_name("info")
                .about("Show geometry and free space")
                .arg(image_arg()),
        )
        .subcommand(
            SubCommand::with_name("ls")
                .about("List files")
                .arg(image_arg()),
        )
        .subcommand(
            SubCommand::with_name("add")
                .about("Copy a host file into the image")
                .arg(image_arg())
                .arg(
                    Arg::with_name("host_file")
                        .required(true)
                        .help("File to copy"),
                )
                .arg(
                    Arg::with_name("name")
                        .long("name")
                        .takes_value(true)
                        .help("Name inside the image, defaults to the host file name"),
                ),
        )
        .subcommand(
            SubCommand::with_name("cat")
                .about("Print a file")
                .arg(image_arg())
                .arg(name_arg()),
        )
        .subcommand(
            SubCommand::with_name("stat")
                .about("Print the size of a file")
                .arg(image_arg())
                .arg(name_arg()),
        )
        .subcommand(
            SubCommand::with_name("rm")
                .about("Delete a file")
                .arg(image_arg())
                .arg(name_arg()),
        )
        .get_matches();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match matches.subcommand() {
        ("make", Some(sub)) => {
            let data_blocks = value(sub, "data_blocks")?.parse::<usize>().map_err(|err| {
                io::Error::new(io::ErrorKind::InvalidInput, format!("data_blocks: {}", err))
            })?;
            commands::make(Path::new(value(sub, "image")?), data_blocks, &mut out)
        }
        ("info", Some(sub)) => commands::info(Path::new(value(sub, "image")?), &mut out),
        ("ls", Some(sub)) => commands::ls(Path::new(value(sub, "image")?), &mut out),
        ("add", Some(sub)) => {
            let host_file = Path::new(value(sub, "host_file")?);
            let name = match sub.value_of("name") {
                Some(name) => name.to_string(),
                None => host_file
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidInput, "host file has no name")
                    })?,
            };
            let data = fs::read(host_file)?;
            commands::add(Path::new(value(sub, "image")?), &name, &data, &mut out)
        }
        ("cat", Some(sub)) => {
            commands::cat(Path::new(value(sub, "image")?), value(sub, "name")?, &mut out)
        }
        ("stat", Some(sub)) => {
            commands::stat(Path::new(value(sub, "image")?), value(sub, "name")?, &mut out)
        }
        ("rm", Some(sub)) => {
            commands::rm(Path::new(value(sub, "image")?), value(sub, "name")?, &mut out)
        }
        _ => Ok(()),
    }
}
