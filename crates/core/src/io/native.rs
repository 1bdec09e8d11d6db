//! Native GeoTIFF reading/writing
//!
//! Uses the `tiff` crate for basic TIFF I/O. Only single-band rasters are
//! supported; the georeferencing is read from the GeoTIFF tags below.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use num_traits::NumCast;
use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::colortype::Gray32Float;
use tiff::encoder::TiffEncoder;
use tiff::tags::Tag;

const MODEL_PIXEL_SCALE_TAG: u16 = 33550;
const MODEL_TIEPOINT_TAG: u16 = 33922;
const MODEL_TRANSFORMATION_TAG: u16 = 34264;
const GEO_KEY_DIRECTORY_TAG: u16 = 34735;
const GDAL_NODATA_TAG: u16 = 42113;

const GT_RASTER_TYPE_GEOKEY: u32 = 1025;
const RASTER_PIXEL_IS_POINT: u32 = 2;

/// Resolve a GeoTIFF tag code.
///
/// Newer `tiff` releases name some of these tags, and a named tag never
/// compares equal to `Tag::Unknown` with the same code.
fn geotiff_tag(code: u16) -> Tag {
    Tag::from_u16_exhaustive(code)
}

/// Read a single-band GeoTIFF file into a Raster
///
/// Fails with [`Error::InvalidRaster`] if the file cannot be opened, is not
/// a TIFF, or has more than one sample per pixel.
pub fn read_geotiff<T, P>(path: P) -> Result<Raster<T>>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| Error::invalid_raster(format!("cannot open {}: {}", path.display(), e)))?;
    decode_geotiff(BufReader::new(file))
}

/// Read a GeoTIFF from an in-memory buffer into a Raster
///
/// Same as `read_geotiff` but operates on a byte slice instead of a file path.
pub fn read_geotiff_from_buffer<T>(data: &[u8]) -> Result<Raster<T>>
where
    T: RasterElement,
{
    decode_geotiff(Cursor::new(data))
}

/// Internal: decode a GeoTIFF from any `Read + Seek` source
fn decode_geotiff<T, R>(reader: R) -> Result<Raster<T>>
where
    T: RasterElement,
    R: std::io::Read + std::io::Seek,
{
    let mut decoder = Decoder::new(reader)
        .map_err(|e| Error::invalid_raster(format!("TIFF decode error: {}", e)))?;

    let samples = decoder.get_tag_u32(Tag::SamplesPerPixel).unwrap_or(1);
    if samples != 1 {
        return Err(Error::invalid_raster(format!(
            "expected a single-band raster, found {} bands",
            samples
        )));
    }

    let (width, height) = decoder
        .dimensions()
        .map_err(|e| Error::invalid_raster(format!("cannot read dimensions: {}", e)))?;

    let rows = height as usize;
    let cols = width as usize;

    let result = decoder
        .read_image()
        .map_err(|e| Error::invalid_raster(format!("cannot read image data: {}", e)))?;

    // Float32 samples are widened on read; the no-data text must round the same way
    let f32_samples = matches!(result, DecodingResult::F32(_));

    #[allow(unreachable_patterns)]
    let data: Vec<T> = match result {
        DecodingResult::U8(buf) => cast_samples(buf),
        DecodingResult::U16(buf) => cast_samples(buf),
        DecodingResult::U32(buf) => cast_samples(buf),
        DecodingResult::U64(buf) => cast_samples(buf),
        DecodingResult::I8(buf) => cast_samples(buf),
        DecodingResult::I16(buf) => cast_samples(buf),
        DecodingResult::I32(buf) => cast_samples(buf),
        DecodingResult::I64(buf) => cast_samples(buf),
        DecodingResult::F32(buf) => cast_samples(buf),
        DecodingResult::F64(buf) => cast_samples(buf),
        _ => return Err(Error::UnsupportedDataType("Unsupported TIFF pixel format".to_string())),
    };

    if data.len() != rows * cols {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    let mut raster = Raster::from_vec(data, rows, cols)?;

    let geokeys = decoder
        .get_tag_u32_vec(geotiff_tag(GEO_KEY_DIRECTORY_TAG))
        .ok();

    if let Some(mut transform) = read_geotransform(&mut decoder) {
        let raster_type = geokeys
            .as_deref()
            .and_then(|keys| geokey_value(keys, GT_RASTER_TYPE_GEOKEY));
        if raster_type == Some(RASTER_PIXEL_IS_POINT) {
            // The tiepoint names the center of the first cell, not its corner
            transform.origin_x -= 0.5 * (transform.pixel_width + transform.row_rotation);
            transform.origin_y -= 0.5 * (transform.col_rotation + transform.pixel_height);
        }
        raster.set_transform(transform);
    }

    if let Some(nodata) = read_nodata(&mut decoder) {
        let nodata = if f32_samples { nodata as f32 as f64 } else { nodata };
        raster.set_nodata(T::from_f64(nodata));
    }

    if let Some(keys) = &geokeys {
        raster.set_crs(CRS::from_geokeys(keys));
    }

    Ok(raster)
}

/// Cast decoded samples into the raster element type.
///
/// Samples that do not fit become the element's default no-data value.
fn cast_samples<S, T>(buf: Vec<S>) -> Vec<T>
where
    S: NumCast + Copy,
    T: RasterElement,
{
    buf.into_iter()
        .map(|v| num_traits::cast(v).unwrap_or_else(T::default_nodata))
        .collect()
}

/// Inline value of a GeoKey, if present
fn geokey_value(keys: &[u32], id: u32) -> Option<u32> {
    keys.get(4..)?
        .chunks_exact(4)
        .find(|key| key[0] == id && key[1] == 0)
        .map(|key| key[3])
}

/// Read the GeoTransform from the TIFF tags.
///
/// ModelPixelScale + ModelTiepoint is tried first, then ModelTransformation.
fn read_geotransform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Option<GeoTransform> {
    let scale = decoder.get_tag_f64_vec(geotiff_tag(MODEL_PIXEL_SCALE_TAG)).ok();
    let tiepoint = decoder.get_tag_f64_vec(geotiff_tag(MODEL_TIEPOINT_TAG)).ok();

    if let (Some(scale), Some(tiepoint)) = (scale, tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            // tiepoint: [I, J, K, X, Y, Z]
            // scale: [ScaleX, ScaleY, ScaleZ]
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return Some(GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]));
        }
    }

    // Row-major 4x4 matrix mapping (col, row, 0, 1) to (x, y, z, 1)
    let m = decoder
        .get_tag_f64_vec(geotiff_tag(MODEL_TRANSFORMATION_TAG))
        .ok()?;
    if m.len() < 16 {
        return None;
    }
    Some(GeoTransform::from_gdal([m[3], m[0], m[1], m[7], m[4], m[5]]))
}

/// Read the GDAL_NODATA ASCII tag
fn read_nodata<R: std::io::Read + std::io::Seek>(decoder: &mut Decoder<R>) -> Option<f64> {
    let text = decoder
        .get_tag_ascii_string(geotiff_tag(GDAL_NODATA_TAG))
        .ok()?;
    let text = text.trim_end_matches('\0').trim();
    match text.to_ascii_lowercase().as_str() {
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

/// Write a Raster to a GeoTIFF file
///
/// Writes as 32-bit float with georeferencing, geokey and GDAL_NODATA tags.
/// North-up rasters get pixel scale + tiepoint, rotated ones a
/// ModelTransformation matrix.
pub fn write_geotiff<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let file = File::create(path.as_ref())?;
    encode_geotiff(raster, file)
}

/// Write a Raster to an in-memory GeoTIFF buffer
pub fn write_geotiff_to_buffer<T>(raster: &Raster<T>) -> Result<Vec<u8>>
where
    T: RasterElement,
{
    let mut buf = Vec::new();
    encode_geotiff(raster, Cursor::new(&mut buf))?;
    Ok(buf)
}

/// Internal: encode a Raster as GeoTIFF into any `Write + Seek` sink
fn encode_geotiff<T, W>(raster: &Raster<T>, writer: W) -> Result<()>
where
    T: RasterElement,
    W: std::io::Write + std::io::Seek,
{
    let tiff_err = |what: &str, e: tiff::TiffError| Error::Other(format!("{}: {}", what, e));

    let mut encoder = TiffEncoder::new(writer).map_err(|e| tiff_err("TIFF encoder error", e))?;

    let (rows, cols) = raster.shape();

    // `as` rounds to the nearest f32; a checked cast would turn f32::MIN-like
    // sentinels into NaN
    let data: Vec<f32> = raster
        .data()
        .iter()
        .map(|&v| v.to_f64().map_or(f32::NAN, |v| v as f32))
        .collect();

    let mut image = encoder
        .new_image::<Gray32Float>(cols as u32, rows as u32)
        .map_err(|e| tiff_err("Cannot create TIFF image", e))?;

    let gt = raster.transform();

    if gt.row_rotation != 0.0 || gt.col_rotation != 0.0 {
        #[rustfmt::skip]
        let matrix = vec![
            gt.pixel_width, gt.row_rotation, 0.0, gt.origin_x,
            gt.col_rotation, gt.pixel_height, 0.0, gt.origin_y,
            0.0, 0.0, 0.0, 0.0,
            0.0, 0.0, 0.0, 1.0,
        ];
        image
            .encoder()
            .write_tag(geotiff_tag(MODEL_TRANSFORMATION_TAG), matrix.as_slice())
            .map_err(|e| tiff_err("Cannot write transformation tag", e))?;
    } else {
        let scale = vec![gt.pixel_width, gt.pixel_height.abs(), 0.0];
        image
            .encoder()
            .write_tag(geotiff_tag(MODEL_PIXEL_SCALE_TAG), scale.as_slice())
            .map_err(|e| tiff_err("Cannot write scale tag", e))?;

        let tiepoint = vec![0.0, 0.0, 0.0, gt.origin_x, gt.origin_y, 0.0];
        image
            .encoder()
            .write_tag(geotiff_tag(MODEL_TIEPOINT_TAG), tiepoint.as_slice())
            .map_err(|e| tiff_err("Cannot write tiepoint tag", e))?;
    }

    let geokeys = geokey_directory(raster.crs());
    image
        .encoder()
        .write_tag(geotiff_tag(GEO_KEY_DIRECTORY_TAG), geokeys.as_slice())
        .map_err(|e| tiff_err("Cannot write geokey tag", e))?;

    // Written as the f32 the sentinel pixels are stored as
    if let Some(nodata) = raster.nodata().and_then(|nd| nd.to_f64()) {
        let text = (nodata as f32).to_string();
        image
            .encoder()
            .write_tag(geotiff_tag(GDAL_NODATA_TAG), text.as_str())
            .map_err(|e| tiff_err("Cannot write nodata tag", e))?;
    }

    image
        .write_data(&data)
        .map_err(|e| tiff_err("Cannot write image data", e))?;

    Ok(())
}

/// Minimal GeoKeyDirectory: model type, raster type (PixelIsArea) and, when
/// known, the EPSG code. Codes in 4000..5000 are written as geographic.
fn geokey_directory(crs: Option<&CRS>) -> Vec<u16> {
    let epsg = crs
        .and_then(CRS::epsg)
        .and_then(|code| u16::try_from(code).ok());
    let geographic = epsg.is_some_and(|code| (4000..5000).contains(&code));
    let model_type = if geographic { 2 } else { 1 };

    let mut keys: Vec<u16> = vec![
        1, 1, 0, 2, // Version 1.1.0, key count patched below
        1024, 0, 1, model_type, // GTModelTypeGeoKey
        1025, 0, 1, 1, // GTRasterTypeGeoKey = RasterPixelIsArea
    ];
    if let Some(code) = epsg {
        let key = if geographic { 2048 } else { 3072 };
        keys.extend_from_slice(&[key, 0, 1, code]);
        keys[3] = 3;
    }
    keys
}
