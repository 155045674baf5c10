//! PE image writer.
//!
//! Serializes a laid-out [`PeImage`] into the bytes of a PE file.

use crate::error::{malformed, Error, Result};
use crate::image::PeImage;
use crate::records::{OptionalHeader, Record};

/// Serializes `image` using the geometry of its last layout.
///
/// Headers are written back to back from offset 0, followed by the raw data
/// of every section that occupies file space, each at its assigned offset
/// and zero-padded to its raw size.
pub fn serialize(image: &PeImage) -> Result<Vec<u8>> {
    let layout = image.layout.ok_or(Error::NotLaidOut)?;
    if let OptionalHeader::Pe32Plus(_) = image.optional_header {
        return Err(Error::Unsupported("PE32+ serialization"));
    }

    let mut headers = Vec::with_capacity(layout.size_of_headers as usize);
    image.dos_header.write(&mut headers);
    headers.extend_from_slice(&image.dos_stub);
    image.nt_signature.write(&mut headers);
    image.file_header.write(&mut headers);
    image.optional_header.write(&mut headers);
    image.data_directories.write(&mut headers);
    for section in &image.sections {
        section.header().write(&mut headers);
    }
    if headers.len() > layout.size_of_headers as usize {
        return Err(malformed!(
            "headers take 0x{:x} bytes but SizeOfHeaders is 0x{:x}",
            headers.len(),
            layout.size_of_headers
        ));
    }

    let mut buffer = vec![0u8; layout.file_size as usize];
    buffer[..headers.len()].copy_from_slice(&headers);

    let mut placed: Vec<_> = image
        .sections
        .iter()
        .filter(|s| s.contributes_to_file_size())
        .collect();
    placed.sort_by_key(|s| s.physical_address());
    for section in placed {
        let start = section.physical_address() as usize;
        let end = start + section.raw_size() as usize;
        let data = section.data();
        let target = buffer
            .get_mut(start..end)
            .filter(|target| target.len() >= data.len())
            .ok_or_else(|| {
                malformed!(
                    "section {} at 0x{:x}..0x{:x} does not fit the 0x{:x} byte image",
                    section.name(),
                    start,
                    end,
                    layout.file_size
                )
            })?;
        target[..data.len()].copy_from_slice(data);
        tracing::trace!("wrote {} at 0x{:x}", section.name(), start);
    }

    tracing::debug!("serialized image: {} bytes", buffer.len());
    Ok(buffer)
}
