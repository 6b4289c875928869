// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware package discovery and loading.
//!
//! A package is a zip archive (as shipped by the modem vendor) or a directory
//! holding three Intel HEX images, recognised by name:
//! - `*signed.ihex*`: the modem bootloader
//! - `*segments.0*`: the certificate segment
//! - `*segments.1*`: the firmware segment

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use zip::ZipArchive;

use modem_dfu_common::ihex;
use modem_dfu_common::{Record, RecordKind, SegmentTag};

use crate::cli::PackageArgs;

/// Which image a package file holds, from its name.
pub fn classify(file_name: &str) -> Option<SegmentTag> {
    if file_name.contains("signed.ihex") {
        Some(SegmentTag::Bootloader)
    } else if file_name.contains("segments.0") {
        Some(SegmentTag::Certificate)
    } else if file_name.contains("segments.1") {
        Some(SegmentTag::Firmware)
    } else {
        None
    }
}

/// Pick the first candidate whose name does not contain `current_uuid`.
///
/// Without a UUID the first candidate is taken.
pub fn pick<'a>(candidates: &'a [PathBuf], current_uuid: Option<&str>) -> Option<&'a PathBuf> {
    candidates.iter().find(|path| match current_uuid {
        Some(uuid) if !uuid.is_empty() => !file_name(path).contains(uuid),
        _ => true,
    })
}

fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or("")
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to list {}", dir.display()))?;
    entries.sort();
    Ok(entries)
}

fn is_zip(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn open_zip(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    ZipArchive::new(file).with_context(|| format!("Invalid zip archive {}", path.display()))
}

/// Where an image is read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    File(PathBuf),
    /// Member of a zip package, read in memory.
    Zip { archive: PathBuf, member: String },
}

impl ImageSource {
    fn read_to_string(&self) -> Result<String> {
        match self {
            Self::File(path) => {
                fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
            }
            Self::Zip { archive, member } => {
                let mut zip = open_zip(archive)?;
                let mut file = zip
                    .by_name(member)
                    .with_context(|| format!("No {} in {}", member, archive.display()))?;
                let mut text = String::new();
                file.read_to_string(&mut text)
                    .with_context(|| format!("Failed to read {} from {}", member, archive.display()))?;
                Ok(text)
            }
        }
    }
}

impl fmt::Display for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Zip { archive, member } => write!(f, "{}:{}", archive.display(), member),
        }
    }
}

/// Sources of the three images of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePaths {
    /// Package directory or archive the images were taken from, if any.
    pub package: Option<PathBuf>,
    pub bootloader: ImageSource,
    pub certificate: ImageSource,
    pub firmware: ImageSource,
}

impl PackagePaths {
    /// Classify named sources, the first match of each kind wins.
    fn classify_all<I>(package: &Path, sources: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, ImageSource)>,
    {
        let mut bootloader = None;
        let mut certificate = None;
        let mut firmware = None;

        for (name, source) in sources {
            let slot = match classify(&name) {
                Some(SegmentTag::Bootloader) => &mut bootloader,
                Some(SegmentTag::Certificate) => &mut certificate,
                Some(SegmentTag::Firmware) => &mut firmware,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(source);
            }
        }

        Ok(Self {
            package: Some(package.to_path_buf()),
            bootloader: bootloader.with_context(|| {
                format!("No bootloader image (*signed.ihex) in {}", package.display())
            })?,
            certificate: certificate.with_context(|| {
                format!("No certificate segment (*segments.0*) in {}", package.display())
            })?,
            firmware: firmware.with_context(|| {
                format!("No firmware segment (*segments.1*) in {}", package.display())
            })?,
        })
    }

    /// Classify the files of a package directory.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let sources = sorted_entries(dir)?
            .into_iter()
            .map(|path| (file_name(&path).to_string(), ImageSource::File(path)));
        Self::classify_all(dir, sources)
    }

    /// Classify the members of a zip package.
    pub fn from_zip(archive: &Path) -> Result<Self> {
        let zip = open_zip(archive)?;
        let mut members: Vec<String> = zip
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        members.sort();

        let sources = members.into_iter().map(|member| {
            let source = ImageSource::Zip {
                archive: archive.to_path_buf(),
                member: member.clone(),
            };
            (member, source)
        });
        Self::classify_all(archive, sources)
    }

    /// Classify a package directory or zip archive.
    pub fn from_package(path: &Path) -> Result<Self> {
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_zip(path)
        }
    }

    /// Resolve the images to send from the command line.
    ///
    /// With `--packages`, the first package (directory or `*.zip`) not named
    /// after `current_uuid` is used; explicit image paths override its files.
    pub fn resolve(args: &PackageArgs, current_uuid: Option<&str>) -> Result<Self> {
        let from_package = match &args.packages {
            Some(root) => {
                let candidates: Vec<PathBuf> = sorted_entries(root)?
                    .into_iter()
                    .filter(|p| p.is_dir() || is_zip(p))
                    .collect();
                let package = pick(&candidates, current_uuid).with_context(|| {
                    format!(
                        "No package in {} differs from the current firmware",
                        root.display()
                    )
                })?;
                log::debug!("Selected package {}", package.display());
                Some(Self::from_package(package)?)
            }
            None => None,
        };

        let choose = |explicit: &Option<PathBuf>,
                      packaged: Option<&ImageSource>,
                      what: &str|
         -> Result<ImageSource> {
            match (explicit, packaged) {
                (Some(path), _) => Ok(ImageSource::File(path.clone())),
                (None, Some(source)) => Ok(source.clone()),
                (None, None) => bail!("No {} image: pass --packages or --{}", what, what),
            }
        };

        Ok(Self {
            package: from_package.as_ref().and_then(|p| p.package.clone()),
            bootloader: choose(
                &args.bootloader,
                from_package.as_ref().map(|p| &p.bootloader),
                "bootloader",
            )?,
            certificate: choose(
                &args.certificate,
                from_package.as_ref().map(|p| &p.certificate),
                "certificate",
            )?,
            firmware: choose(
                &args.firmware,
                from_package.as_ref().map(|p| &p.firmware),
                "firmware",
            )?,
        })
    }
}

/// One parsed image, every record tagged with the image's segment.
pub struct Image {
    pub segment: SegmentTag,
    pub source: ImageSource,
    pub records: Vec<Record>,
}

impl Image {
    pub fn load(source: &ImageSource, segment: SegmentTag) -> Result<Self> {
        let text = source.read_to_string()?;
        let records = ihex::parse_image(&text, segment)
            .with_context(|| format!("Invalid Intel HEX in {}", source))?;

        if records.last().map(|r| r.kind) != Some(RecordKind::EndOfFile) {
            log::warn!("{} does not end with an end-of-file record", source);
        }

        Ok(Self {
            segment,
            source: source.clone(),
            records,
        })
    }

    /// Bytes this image takes on the wire.
    pub fn wire_len(&self) -> usize {
        self.records.iter().map(Record::wire_len).sum()
    }

    /// Data payload bytes, in record order.
    pub fn data(&self) -> impl Iterator<Item = &[u8]> {
        self.records
            .iter()
            .filter(|r| r.kind == RecordKind::Data)
            .map(|r| &r.payload[..])
    }
}

/// The three images of a package, in sending order.
pub struct Package {
    pub images: [Image; 3],
}

impl Package {
    pub fn load(paths: &PackagePaths) -> Result<Self> {
        Ok(Self {
            images: [
                Image::load(&paths.bootloader, SegmentTag::Bootloader)?,
                Image::load(&paths.certificate, SegmentTag::Certificate)?,
                Image::load(&paths.firmware, SegmentTag::Firmware)?,
            ],
        })
    }

    pub fn wire_len(&self) -> usize {
        self.images.iter().map(Image::wire_len).sum()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.images.iter().flat_map(|image| image.records.iter())
    }
}
