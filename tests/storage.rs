use catalog_api::storage::{ImageKind, ImageStorage};

#[tokio::test]
async fn put_names_files_by_timestamp_and_extension() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = ImageStorage::new(dir.path().join("product"));

    let name = storage.put(b"jpeg bytes", ImageKind::Jpeg).await?;
    let (stem, ext) = name.split_once('.').expect("extension");
    assert_eq!(ext, "jpg");
    assert!(stem.parse::<i64>().is_ok(), "stem {stem} is a unix timestamp");

    assert!(storage.exists(&name).await?);
    assert_eq!(tokio::fs::read(storage.path_of(&name)).await?, b"jpeg bytes");
    Ok(())
}

#[tokio::test]
async fn same_second_uploads_do_not_overwrite() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = ImageStorage::new(dir.path());

    let mut names = Vec::new();
    for i in 0..3u8 {
        names.push(storage.put(&[i; 4], ImageKind::Png).await?);
    }
    names.sort();
    names.dedup();
    assert_eq!(names.len(), 3);

    for name in &names {
        assert!(name.ends_with(".png"));
        assert!(storage.exists(name).await?);
    }
    Ok(())
}

#[tokio::test]
async fn delete_removes_file_and_tolerates_missing() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let storage = ImageStorage::new(dir.path());

    let name = storage.put(b"png", ImageKind::Png).await?;
    storage.delete(&name).await?;
    assert!(!storage.exists(&name).await?);

    storage.delete(&name).await?;
    Ok(())
}

#[tokio::test]
async fn names_cannot_leave_the_root() {
    let dir = tempfile::tempdir().expect("tempdir");
    let storage = ImageStorage::new(dir.path());

    for name in ["../secret.png", "a/b.png", "..", ""] {
        assert!(storage.delete(name).await.is_err(), "{name:?} accepted");
    }
}

#[test]
fn detects_only_jpeg_and_png() {
    assert_eq!(ImageKind::detect(&[0xFF, 0xD8, 0xFF, 0xDB]), Some(ImageKind::Jpeg));
    assert_eq!(ImageKind::detect(b"\x89PNG\r\n\x1a\n...."), Some(ImageKind::Png));
    assert_eq!(ImageKind::detect(b"GIF89a......"), None);
    assert_eq!(ImageKind::detect(b"hello"), None);
}
