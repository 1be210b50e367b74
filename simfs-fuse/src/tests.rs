//! 针对真实后备文件的端到端测试

use std::path::PathBuf;

use enumflags2::BitFlags;

use simfs::{CallerContext, DescriptorKind, Error, SimFileSystem};

fn temp_image(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("simfs-{tag}-{}.img", std::process::id()))
}

fn ctx(uid: u32, pid: u32) -> CallerContext {
    CallerContext {
        uid,
        gid: uid,
        pid,
        umask: BitFlags::all(),
    }
}

#[test]
fn end_to_end_scenario() {
    let image = temp_image("e2e");
    SimFileSystem::create(&image).unwrap();

    let caller = ctx(1, 1);
    {
        let fs = SimFileSystem::mount(&image).unwrap();
        let mut fs = fs.lock();

        fs.create_entry("a.txt", DescriptorKind::File, &caller).unwrap();
        let handle = fs.open("a.txt", &caller).unwrap();
        fs.write(handle, b"hello").unwrap();
        assert_eq!(fs.read(handle).unwrap(), b"hello");
        fs.close(handle).unwrap();

        fs.unmount(&image).unwrap();
    }

    // 重新挂载：内容与元数据都来自落盘的快照
    let fs = SimFileSystem::mount(&image).unwrap();
    let mut fs = fs.lock();
    assert_eq!(fs.stat("a.txt").unwrap().size, 5);

    let handle = fs.open("a.txt", &caller).unwrap();
    assert_eq!(fs.read(handle).unwrap(), b"hello");
    fs.close(handle).unwrap();

    std::fs::remove_file(&image).unwrap();
}

#[test]
fn packed_tree_survives_remount() {
    let image = temp_image("tree");
    SimFileSystem::create(&image).unwrap();

    let caller = ctx(2, 9);
    let payloads: Vec<(String, Vec<u8>)> = [0, 300, 4096]
        .into_iter()
        .map(|len| (format!("file-{len}"), crate::generate_content(len)))
        .collect();

    {
        let fs = SimFileSystem::mount(&image).unwrap();
        let mut fs = fs.lock();
        fs.create_entry("docs", DescriptorKind::Folder, &caller).unwrap();

        for (name, data) in &payloads {
            fs.create_entry(name, DescriptorKind::File, &caller).unwrap();
            let handle = fs.open(name, &caller).unwrap();
            fs.write(handle, data).unwrap();
            fs.close(handle).unwrap();
        }
        fs.unmount(&image).unwrap();
    }

    let fs = SimFileSystem::mount(&image).unwrap();
    let mut fs = fs.lock();
    assert_eq!(fs.stat("docs").unwrap().kind, DescriptorKind::Folder);

    for (name, data) in &payloads {
        assert_eq!(fs.stat(name).unwrap().size as usize, data.len());
        let handle = fs.open(name, &caller).unwrap();
        assert_eq!(&fs.read(handle).unwrap(), data);
        fs.close(handle).unwrap();
    }

    std::fs::remove_file(&image).unwrap();
}

#[test]
fn mount_rejects_foreign_image() {
    let image = temp_image("garbage");
    std::fs::write(&image, b"not a volume").unwrap();

    assert!(matches!(
        SimFileSystem::mount(&image),
        Err(Error::Read | Error::Alloc)
    ));

    std::fs::remove_file(&image).unwrap();
}
