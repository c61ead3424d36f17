#![allow(dead_code)]

use packferry::package::{FileRef, Manifestation, Package, Unit};

/// A fonds with two series: four correspondence masters and three photo
/// masters. With a bound of 3 this splits into a structural chunk, the
/// oversized correspondence manifestation alone, and the photo album.
pub fn two_series_fonds() -> Package {
    Package::new()
        .with_unit(Unit::root("fonds", "Estate papers"))
        .with_unit(Unit::child("corr", "Correspondence series", "fonds"))
        .with_unit(Unit::child("photos", "Photograph album", "fonds"))
        .with_file(FileRef::new("c-1", "corr/0001.tif"))
        .with_file(FileRef::new("c-2", "corr/0002.tif"))
        .with_file(FileRef::new("c-3", "corr/0003.tif"))
        .with_file(FileRef::new("c-4", "corr/0004.tif"))
        .with_file(FileRef::new("p-1", "photos/0001.tif"))
        .with_file(FileRef::new("p-2", "photos/0002.tif"))
        .with_file(FileRef::new("p-3", "photos/0003.tif"))
        .with_manifestation(Manifestation::new(
            "corr-master",
            "corr",
            ["c-1", "c-2", "c-3", "c-4"],
        ))
        .with_manifestation(Manifestation::new(
            "photos-master",
            "photos",
            ["p-1", "p-2", "p-3"],
        ))
}

/// A root with one child unit per manifestation. `sizes[m]` is the file
/// count of manifestation `m{m}`, owned by unit `u{m}`, with files
/// `f{m}-{i}` appended to the file table in manifestation order.
pub fn fan_out_package(sizes: &[usize]) -> Package {
    let mut package = Package::new().with_unit(Unit::root("root", "Root collection"));
    for m in 0..sizes.len() {
        package = package.with_unit(Unit::child(
            format!("u{m}"),
            format!("Unit {m}"),
            "root",
        ));
    }
    for (m, &size) in sizes.iter().enumerate() {
        let ids: Vec<String> = (0..size).map(|i| format!("f{m}-{i}")).collect();
        for id in &ids {
            package = package.with_file(FileRef::new(id.clone(), format!("data/{id}.bin")));
        }
        package = package.with_manifestation(Manifestation::new(
            format!("m{m}"),
            format!("u{m}"),
            ids,
        ));
    }
    package
}

/// A single descent chain `root -> u0 -> u1 -> ...`. `Some(n)` gives `u{d}`
/// a manifestation `m{d}` of `n` files; `None` leaves it content-free.
pub fn chain_package(levels: &[Option<usize>]) -> Package {
    let mut package = Package::new().with_unit(Unit::root("root", "Root collection"));
    let mut parent = "root".to_string();
    for depth in 0..levels.len() {
        let id = format!("u{depth}");
        package = package.with_unit(Unit::child(id.clone(), format!("Level {depth}"), parent));
        parent = id;
    }
    for (depth, level) in levels.iter().enumerate() {
        if let Some(size) = level {
            let ids: Vec<String> = (0..*size).map(|i| format!("f{depth}-{i}")).collect();
            for id in &ids {
                package = package.with_file(FileRef::new(id.clone(), format!("data/{id}.bin")));
            }
            package = package.with_manifestation(Manifestation::new(
                format!("m{depth}"),
                format!("u{depth}"),
                ids,
            ));
        }
    }
    package
}
