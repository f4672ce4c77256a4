use std::io::Cursor;
use std::sync::OnceLock;
use std::thread;

use anyhow::{bail, Context, Result};
use dicom_object::{from_reader, DefaultDicomObject, ReadError};
use dicom_pixeldata::PixelDecoder;

use crate::session::{
    DatasetInfo, DecodedSlice, FramePixels, SeriesVolume, Session, SingleImage, SliceGeometry,
};

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";

pub trait Decoder: Send + Sync {
    fn create_single(&self, bytes: &[u8]) -> Result<Session>;

    fn create_series(&self, files: &[Vec<u8>]) -> Result<Session>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DicomDecoder;

impl Decoder for DicomDecoder {
    fn create_single(&self, bytes: &[u8]) -> Result<Session> {
        let slice = decode_slice(bytes)?;
        log::info!(
            "Decoded {}x{} image with {} frame(s), {} ({})",
            slice.width,
            slice.height,
            slice.frames.len(),
            slice.info.photometric,
            slice.info.transfer_syntax_uid
        );
        Ok(Session::Single(SingleImage::new(slice)?))
    }

    fn create_series(&self, files: &[Vec<u8>]) -> Result<Session> {
        if files.is_empty() {
            bail!("Series contains no images");
        }
        let slices = decode_all(files)?;
        let volume = SeriesVolume::from_slices(slices)?;
        let (x, y, z) = volume.dims();
        log::info!(
            "Assembled {x}x{y}x{z} volume (sagittal aspect {:.3}, coronal aspect {:.3})",
            volume.sagittal_aspect,
            volume.coronal_aspect
        );
        Ok(Session::Series(volume))
    }
}

/// Decodes every file on a striped worker pool. The first failure fails
/// the whole series.
fn decode_all(files: &[Vec<u8>]) -> Result<Vec<DecodedSlice>> {
    let worker_count = decode_worker_count(files.len());
    if worker_count <= 1 {
        return files
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                decode_slice(bytes).with_context(|| format!("Could not decode file {}", index + 1))
            })
            .collect();
    }

    let mut slots: Vec<Option<DecodedSlice>> = Vec::new();
    slots.resize_with(files.len(), || None);

    thread::scope(|scope| -> Result<()> {
        let workers = (0..worker_count)
            .map(|worker_id| {
                scope.spawn(move || -> Result<Vec<(usize, DecodedSlice)>> {
                    (worker_id..files.len())
                        .step_by(worker_count)
                        .map(|index| {
                            decode_slice(&files[index])
                                .map(|slice| (index, slice))
                                .with_context(|| format!("Could not decode file {}", index + 1))
                        })
                        .collect()
                })
            })
            .collect::<Vec<_>>();

        for worker in workers {
            match worker.join() {
                Ok(result) => {
                    for (index, slice) in result? {
                        slots[index] = Some(slice);
                    }
                }
                Err(_) => bail!("Series decode worker panicked"),
            }
        }
        Ok(())
    })?;

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.with_context(|| format!("File {} was not decoded", index + 1)))
        .collect()
}

pub fn decode_slice(bytes: &[u8]) -> Result<DecodedSlice> {
    let obj = open_dicom_bytes(bytes)?;

    let width: usize = obj
        .element_by_name("Columns")
        .context("Missing Columns tag")?
        .to_int()
        .context("Invalid Columns value")?;
    let height: usize = obj
        .element_by_name("Rows")
        .context("Missing Rows tag")?
        .to_int()
        .context("Invalid Rows value")?;

    let info = DatasetInfo {
        modality: read_string(&obj, "Modality"),
        photometric: read_string(&obj, "PhotometricInterpretation")
            .unwrap_or_else(|| "MONOCHROME2".to_string()),
        transfer_syntax_uid: obj
            .meta()
            .transfer_syntax
            .trim_end_matches('\0')
            .to_string(),
    };

    let frame_count = match read_int_first(&obj, "NumberOfFrames") {
        Some(value) if value > 0 => value as usize,
        Some(value) => bail!("Invalid NumberOfFrames={} (must be >= 1)", value),
        None => 1,
    };

    let mut frames = Vec::with_capacity(frame_count);
    for frame_index in 0..frame_count {
        frames.push(decode_frame(&obj, frame_index, width, height)?);
    }

    let geometry = SliceGeometry {
        pixel_spacing: read_floats::<2>(&obj, "PixelSpacing"),
        slice_thickness: read_float_first(&obj, "SliceThickness"),
        spacing_between_slices: read_float_first(&obj, "SpacingBetweenSlices"),
        position: read_floats::<3>(&obj, "ImagePositionPatient"),
        orientation: read_floats::<6>(&obj, "ImageOrientationPatient"),
    };

    Ok(DecodedSlice {
        info,
        width,
        height,
        frames,
        window_center: read_float_first(&obj, "WindowCenter"),
        window_width: read_float_first(&obj, "WindowWidth"),
        geometry,
    })
}

fn decode_frame(
    obj: &DefaultDicomObject,
    frame_index: usize,
    width: usize,
    height: usize,
) -> Result<FramePixels> {
    let decoded = obj
        .decode_pixel_data_frame(frame_index as u32)
        .with_context(|| format!("Failed to decode PixelData frame {frame_index}"))?;

    let decoded_width = decoded.columns() as usize;
    let decoded_height = decoded.rows() as usize;
    if decoded_width != width || decoded_height != height {
        bail!(
            "Decoded frame dimensions mismatch: decoded={}x{}, tags={}x{}",
            decoded_width,
            decoded_height,
            width,
            height
        );
    }

    let bits_allocated = decoded.bits_allocated();
    if bits_allocated != 8 && bits_allocated != 16 {
        bail!("BitsAllocated={} is not supported (only 8/16)", bits_allocated);
    }

    match decoded.samples_per_pixel() {
        1 => {
            let pixels: Vec<i32> = decoded.to_vec_frame(0).with_context(|| {
                format!("Could not convert decoded frame {frame_index} to i32 samples")
            })?;
            Ok(FramePixels::Mono(pixels))
        }
        spp if spp >= 3 => {
            let expected_len = width
                .checked_mul(height)
                .and_then(|v| v.checked_mul(spp as usize))
                .context("Overflow while calculating color frame size")?;
            let samples: Vec<u8> = if bits_allocated == 8 {
                decoded.to_vec_frame(0).with_context(|| {
                    format!("Could not convert decoded frame {frame_index} to u8 samples")
                })?
            } else {
                let bits_shift = decoded.bits_stored().saturating_sub(8);
                let wide: Vec<u16> = decoded.to_vec_frame(0).with_context(|| {
                    format!("Could not convert decoded frame {frame_index} to u16 samples")
                })?;
                wide.into_iter()
                    .map(|sample| (sample >> bits_shift) as u8)
                    .collect()
            };
            if samples.len() != expected_len {
                bail!(
                    "Decoded color pixel count mismatch in frame {}: got {}, expected {}",
                    frame_index,
                    samples.len(),
                    expected_len
                );
            }
            Ok(FramePixels::Color {
                samples,
                samples_per_pixel: spp,
            })
        }
        other => bail!(
            "Unsupported SamplesPerPixel={} (supports 1 for monochrome and >=3 for color)",
            other
        ),
    }
}

/// Parses a Part 10 stream, with or without the 128-byte preamble.
fn open_dicom_bytes(bytes: &[u8]) -> Result<DefaultDicomObject> {
    let body = strip_preamble(bytes).context("Not a DICOM file: missing DICM marker")?;
    match from_reader(Cursor::new(body)) {
        Ok(obj) => Ok(obj),
        Err(err) => {
            if is_missing_meta_group_length_error(&err) {
                if let Some(repaired) = repair_missing_meta_group_length(body) {
                    return from_reader(Cursor::new(repaired)).context(
                        "Could not parse DICOM after repairing missing File Meta Information Group Length (0002,0000)",
                    );
                }
            }
            Err(err).context("Could not parse DICOM data")
        }
    }
}

fn strip_preamble(bytes: &[u8]) -> Option<&[u8]> {
    if bytes.len() >= PREAMBLE_LEN + MAGIC.len()
        && &bytes[PREAMBLE_LEN..PREAMBLE_LEN + MAGIC.len()] == MAGIC
    {
        return Some(&bytes[PREAMBLE_LEN..]);
    }
    if bytes.len() >= MAGIC.len() && &bytes[..MAGIC.len()] == MAGIC {
        return Some(bytes);
    }
    None
}

fn is_missing_meta_group_length_error(error: &ReadError) -> bool {
    matches!(
        error,
        ReadError::ParseMetaDataSet {
            source: dicom_object::meta::Error::UnexpectedTag { tag, .. }
        } if tag.group() == 0x0002 && tag.element() != 0x0000
    )
}

fn repair_missing_meta_group_length(body: &[u8]) -> Option<Vec<u8>> {
    let offset = MAGIC.len();
    if body.len() < offset + 4 {
        return None;
    }

    let first_group = u16::from_le_bytes([body[offset], body[offset + 1]]);
    let first_element = u16::from_le_bytes([body[offset + 2], body[offset + 3]]);
    if first_group != 0x0002 || first_element == 0x0000 {
        return None;
    }

    let group_len = u32::try_from(meta_group_len(body, offset)?).ok()?;

    let mut repaired = Vec::with_capacity(body.len() + 12);
    repaired.extend_from_slice(&body[..offset]);
    repaired.extend_from_slice(&group_length_element(group_len));
    repaired.extend_from_slice(&body[offset..]);
    Some(repaired)
}

fn meta_group_len(bytes: &[u8], start: usize) -> Option<usize> {
    let mut position = start;
    while position + 8 <= bytes.len() {
        let group = u16::from_le_bytes([bytes[position], bytes[position + 1]]);
        if group != 0x0002 {
            break;
        }

        let vr = [bytes[position + 4], bytes[position + 5]];
        let (header_len, value_len) = explicit_vr_element_length(bytes, position, vr)?;
        let next = position
            .checked_add(header_len)?
            .checked_add(value_len as usize)?;
        if next > bytes.len() {
            return None;
        }
        position = next;
    }

    (position > start).then(|| position - start)
}

fn explicit_vr_element_length(bytes: &[u8], position: usize, vr: [u8; 2]) -> Option<(usize, u32)> {
    let long_length = matches!(
        &vr,
        b"OB" | b"OD" | b"OF" | b"OL" | b"OW" | b"SQ" | b"UC" | b"UR" | b"UT" | b"UN"
    );

    if long_length {
        let raw = bytes.get(position + 8..position + 12)?;
        let value_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        if value_len == u32::MAX {
            return None;
        }
        Some((12, value_len))
    } else {
        let value_len = u16::from_le_bytes([bytes[position + 6], bytes[position + 7]]) as u32;
        Some((8, value_len))
    }
}

fn group_length_element(group_len: u32) -> [u8; 12] {
    let mut out = [0u8; 12];
    out[0..2].copy_from_slice(&0x0002u16.to_le_bytes());
    out[2..4].copy_from_slice(&0x0000u16.to_le_bytes());
    out[4..6].copy_from_slice(b"UL");
    out[6..8].copy_from_slice(&4u16.to_le_bytes());
    out[8..12].copy_from_slice(&group_len.to_le_bytes());
    out
}

fn read_string(obj: &DefaultDicomObject, name: &str) -> Option<String> {
    obj.element_by_name(name)
        .ok()
        .and_then(|el| el.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn read_float_first(obj: &DefaultDicomObject, name: &str) -> Option<f32> {
    read_string(obj, name).and_then(|s| parse_multi_valued_number(&s))
}

fn read_int_first(obj: &DefaultDicomObject, name: &str) -> Option<i32> {
    read_string(obj, name).and_then(|value| {
        value
            .split('\\')
            .next()
            .and_then(|v| v.trim().parse::<i32>().ok())
    })
}

fn read_floats<const N: usize>(obj: &DefaultDicomObject, name: &str) -> Option<[f32; N]> {
    read_string(obj, name).and_then(|s| parse_multi_valued_numbers(&s))
}

fn parse_multi_valued_number(value: &str) -> Option<f32> {
    value.split('\\').next()?.trim().parse::<f32>().ok()
}

fn parse_multi_valued_numbers<const N: usize>(value: &str) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut parts = value.split('\\');
    for slot in out.iter_mut() {
        *slot = parts.next()?.trim().parse::<f32>().ok()?;
    }
    parts.next().is_none().then_some(out)
}

fn decode_worker_count(file_count: usize) -> usize {
    let auto_workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .clamp(1, 4);

    let configured = configured_decode_workers().unwrap_or(auto_workers);
    configured.clamp(1, 32).min(file_count.max(1))
}

fn configured_decode_workers() -> Option<usize> {
    static CONFIG: OnceLock<Option<usize>> = OnceLock::new();

    *CONFIG.get_or_init(|| {
        let raw = std::env::var("ORTHOVIEW_DECODE_WORKERS").ok()?;
        let value = raw.trim().parse::<usize>().ok()?;
        if value == 0 {
            log::warn!("Ignoring ORTHOVIEW_DECODE_WORKERS=0");
            return None;
        }
        Some(value)
    })
}
