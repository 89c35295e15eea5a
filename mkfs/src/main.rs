use std::{env, fs, path::Path, process};

use anyhow::{Context as _, bail};
use flatfs::{BLOCK_SIZE, ImageVolume, NUM_BLOCKS};
use log::info;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = env::args().collect::<Vec<String>>();
    if args.len() < 2 {
        eprintln!("Usage: {} fs.img files...", args[0]);
        process::exit(1);
    }

    let image_file = &args[1];
    let contents = &args[2..];

    ImageVolume::format_image(image_file)
        .with_context(|| format!("cannot format image: {image_file}"))?;
    eprintln!("format {image_file}: {NUM_BLOCKS} blocks of {BLOCK_SIZE} bytes");

    let mut vol = ImageVolume::mount_image(image_file)
        .with_context(|| format!("cannot mount image: {image_file}"))?;
    for path in contents {
        let path = Path::new(path);
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            bail!("invalid file name: {}", path.display());
        };

        let data =
            fs::read(path).with_context(|| format!("cannot read file: {}", path.display()))?;
        vol.create(name)
            .with_context(|| format!("cannot create file: {name}"))?;
        let fd = vol.open(name)?;
        let written = vol.write(fd, &data)?;
        vol.close(fd)?;
        if written < data.len() {
            bail!(
                "volume full: wrote {written} of {} bytes of {name}",
                data.len()
            );
        }
        info!("add {name}: {written} bytes");
    }

    eprintln!(
        "{} files, {} bytes used, {} blocks free",
        vol.list().count(),
        vol.used_bytes(),
        vol.free_blocks()
    );
    vol.unmount()?;

    Ok(())
}
