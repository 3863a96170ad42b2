// src/utils/certificate.rs

use ammonia::clean_text;
use png::{BitDepth, ColorType, Encoder};
use qrcode::{EcLevel, QrCode};

use crate::error::AppError;

/// Pixel size of a single QR module in the PNG output.
pub const QR_MODULE_SIZE: usize = 9;
/// Light modules surrounding the code.
pub const QR_BORDER: usize = 2;

/// Built-in certificate layout (A4 landscape at 300 dpi).
pub const DEFAULT_TEMPLATE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="3508" height="2481" viewBox="0 0 3508 2481">
  <rect width="3508" height="2481" fill="#ffffff"/>
  <rect x="60" y="60" width="3388" height="2361" fill="none" stroke="#194E9C" stroke-width="12"/>
  <text x="325" y="700" font-family="sans-serif" font-weight="bold" font-size="160" fill="#194E9C">CERTIFICATE OF COMPLETION</text>
  <text x="325" y="1350" font-family="sans-serif" font-size="70" fill="#194E9C">This certifies that</text>
  <text x="325" y="1575" font-family="sans-serif" font-weight="bold" font-size="225" fill="#194E9C">{{learner_name}}</text>
  <text x="325" y="2035" font-family="sans-serif" font-weight="900" font-size="90" fill="#DB2930">{{course_name}}</text>
  <text x="325" y="2150" font-family="sans-serif" font-size="65" fill="#194E9C">{{issued_at}}</text>
  <text x="3120" y="2100" font-family="sans-serif" font-weight="900" font-size="95" fill="#194E9C">{{score}}</text>
  <g transform="translate(2760,1555)">{{qrcode}}</g>
</svg>
"##;

/// Values printed on a certificate.
#[derive(Debug, Clone)]
pub struct CertificateFields {
    pub learner_name: String,
    pub course_name: String,
    pub score: String,
    pub issued_at: String,
}

fn build_code(data: &str) -> Result<QrCode, AppError> {
    QrCode::with_error_correction_level(data.as_bytes(), EcLevel::H)
        .map_err(|e| AppError::InternalServerError(format!("QR encoding failed: {}", e)))
}

/// Renders `data` as a grayscale PNG QR code and returns the encoded bytes.
pub fn render_qr_png(data: &str) -> Result<Vec<u8>, AppError> {
    let code = build_code(data)?;
    let matrix = code.to_colors();
    let qr_width = code.width();

    let side = (qr_width + 2 * QR_BORDER) * QR_MODULE_SIZE;
    let mut pixels: Vec<u8> = Vec::with_capacity(side * side);

    for y in 0..side {
        for x in 0..side {
            let mx = (x / QR_MODULE_SIZE).checked_sub(QR_BORDER);
            let my = (y / QR_MODULE_SIZE).checked_sub(QR_BORDER);
            let is_dark = match (mx, my) {
                (Some(mx), Some(my)) if mx < qr_width && my < qr_width => matrix
                    .get(my * qr_width + mx)
                    .map(|c| *c == qrcode::Color::Dark)
                    .unwrap_or(false),
                _ => false,
            };
            pixels.push(if is_dark { 0 } else { 255 });
        }
    }

    let mut bytes = Vec::new();
    {
        let mut encoder = Encoder::new(&mut bytes, side as u32, side as u32);
        encoder.set_color(ColorType::Grayscale);
        encoder.set_depth(BitDepth::Eight);

        let mut writer = encoder
            .write_header()
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
        writer
            .write_image_data(&pixels)
            .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    }

    Ok(bytes)
}

/// Renders `data` as an inline `<svg>` element (no XML prolog) for embedding.
pub fn render_qr_svg(data: &str) -> Result<String, AppError> {
    let code = build_code(data)?;
    let document = code
        .render::<qrcode::render::svg::Color>()
        .module_dimensions(QR_MODULE_SIZE as u32, QR_MODULE_SIZE as u32)
        .quiet_zone(true)
        .build();

    let start = document.find("<svg").unwrap_or(0);
    Ok(document[start..].to_string())
}

/// Fills the placeholders of a certificate template.
///
/// Text fields are entity-encoded, so they render as plain text in any SVG
/// text node or attribute.
pub fn render_certificate(template: &str, fields: &CertificateFields, qr_svg: &str) -> String {
    template
        .replace("{{learner_name}}", &clean_text(&fields.learner_name))
        .replace("{{course_name}}", &clean_text(&fields.course_name))
        .replace("{{score}}", &clean_text(&fields.score))
        .replace("{{issued_at}}", &clean_text(&fields.issued_at))
        .replace("{{qrcode}}", qr_svg)
}
