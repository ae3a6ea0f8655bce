use half::f16;

use crate::renderer::device::TextureFormat;

/// Row pitch of a texture-to-buffer copy, padded to the copy alignment.
pub(crate) fn padded_bytes_per_row(width: u32, format: TextureFormat) -> u32 {
    let unpadded = width * format.bytes_per_pixel();
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Convert mapped rows into RGBA f32 texels, dropping the row padding.
pub(crate) fn decode_rows(
    data: &[u8],
    width: u32,
    height: u32,
    format: TextureFormat,
) -> Vec<[f32; 4]> {
    let pitch = padded_bytes_per_row(width, format) as usize;
    let bpp = format.bytes_per_pixel() as usize;
    let mut texels = Vec::with_capacity((width * height) as usize);
    for row in data.chunks(pitch).take(height as usize) {
        for texel in row[..width as usize * bpp].chunks_exact(bpp) {
            texels.push(decode_texel(texel, format));
        }
    }
    texels
}

fn decode_texel(bytes: &[u8], format: TextureFormat) -> [f32; 4] {
    match format {
        TextureFormat::Rgba8Unorm => [
            bytes[0] as f32 / 255.0,
            bytes[1] as f32 / 255.0,
            bytes[2] as f32 / 255.0,
            bytes[3] as f32 / 255.0,
        ],
        TextureFormat::R8Unorm => [bytes[0] as f32 / 255.0, 0.0, 0.0, 1.0],
        TextureFormat::Rgba16Float => {
            let mut out = [0.0; 4];
            for (value, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
                *value = f16::from_le_bytes([pair[0], pair[1]]).to_f32();
            }
            out
        }
        TextureFormat::Rgba32Float => {
            let mut out = [0.0; 4];
            for (value, quad) in out.iter_mut().zip(bytes.chunks_exact(4)) {
                *value = f32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_copy_alignment() {
        assert_eq!(padded_bytes_per_row(1, TextureFormat::Rgba8Unorm), 256);
        assert_eq!(padded_bytes_per_row(64, TextureFormat::Rgba8Unorm), 256);
        assert_eq!(padded_bytes_per_row(65, TextureFormat::Rgba8Unorm), 512);
        assert_eq!(padded_bytes_per_row(32, TextureFormat::Rgba16Float), 256);
    }

    #[test]
    fn half_float_rows_skip_padding() {
        let pitch = padded_bytes_per_row(2, TextureFormat::Rgba16Float) as usize;
        let mut data = vec![0u8; pitch * 2];
        let texel: Vec<u8> = [0.5f32, 1.0, 2.0, 1.0]
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_le_bytes())
            .collect();
        data[pitch + 8..pitch + 16].copy_from_slice(&texel);

        let texels = decode_rows(&data, 2, 2, TextureFormat::Rgba16Float);
        assert_eq!(texels.len(), 4);
        assert_eq!(texels[0], [0.0; 4]);
        assert_eq!(texels[3], [0.5, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn unorm_bytes_scale_to_unit_range() {
        let pitch = padded_bytes_per_row(1, TextureFormat::R8Unorm) as usize;
        let mut data = vec![0u8; pitch];
        data[0] = 255;
        assert_eq!(
            decode_rows(&data, 1, 1, TextureFormat::R8Unorm),
            vec![[1.0, 0.0, 0.0, 1.0]]
        );
    }
}
