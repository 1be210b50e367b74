mod cli;

use std::fs;

use clap::Parser;
use cli::Cli;
use simfs::{ContextProvider, DescriptorKind, SimFileSystem};
use simfs_fuse::RandomContexts;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();
    println!("source={:?}\nout_dir={:?}", cli.source, cli.out_dir);

    let image = cli.out_dir.join("fs.img");
    SimFileSystem::create(&image)?;
    let fs = SimFileSystem::mount(&image)?;
    let contexts = RandomContexts;

    let mut names = Vec::new();
    for entry in fs::read_dir(&cli.source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry
            .file_name()
            .into_string()
            .map_err(|name| format!("source file name isn't UTF-8: {name:?}"))?;
        let data = fs::read(entry.path())?;

        let ctx = contexts.context();
        let mut fs = fs.lock();
        fs.create_entry(&name, DescriptorKind::File, &ctx)?;
        let handle = fs.open(&name, &ctx)?;
        fs.write(handle, &data)?;
        fs.close(handle)?;

        log::info!("packed {name:?} ({} bytes)", data.len());
        names.push(name);
    }

    fs.lock().unmount(&image)?;

    // 重新挂载，核对落盘后的元数据
    let fs = SimFileSystem::mount(&image)?;
    let fs = fs.lock();
    for name in &names {
        let desc = fs.stat(name)?;
        println!("{name}: {} bytes", desc.size);
    }

    Ok(())
}
