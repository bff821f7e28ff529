// 浏览器端预览渲染

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// 大于该字节数的帧视为真实采集数据
pub const CAMERA_FRAME_THRESHOLD: usize = 10_000;

/// 签名计算最多读取的字节数
const SIGNATURE_WINDOW: usize = 1_000;

/// 把一帧原始数据渲染成浏览器可直接显示的图像
pub trait FrameRenderer: Send + Sync {
    /// 返回 data URL；`None` 表示不附带图像
    fn render(&self, frame: &[u8], frame_number: u64) -> Option<String>;
}

/// 不生成预览
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreview;

impl FrameRenderer for NoPreview {
    fn render(&self, _frame: &[u8], _frame_number: u64) -> Option<String> {
        None
    }
}

/// SVG 预览卡片
///
/// 大帧渲染为带数据签名的“camera data”卡片，小帧渲染为随帧号变色的测试图。
#[derive(Debug, Clone, Copy, Default)]
pub struct SignaturePreview;

impl SignaturePreview {
    /// 前 1000 字节之和对 360 取模
    pub fn signature(frame: &[u8]) -> u32 {
        let sum: u64 = frame
            .iter()
            .take(SIGNATURE_WINDOW)
            .map(|b| *b as u64)
            .sum();
        (sum % 360) as u32
    }

    fn camera_card(frame: &[u8], frame_number: u64) -> String {
        let hue = (frame_number * 3 % 360) as u32;
        let signature = Self::signature(frame);
        format!(
            r#"<svg width="320" height="240" xmlns="http://www.w3.org/2000/svg">
<rect width="100%" height="100%" fill="hsl({hue},60%,20%)"/>
<rect x="10" y="10" width="300" height="30" fill="hsl({signature},80%,50%)"/>
<text x="160" y="30" text-anchor="middle" fill="white" font-size="14">CAMERA DATA</text>
<text x="160" y="60" text-anchor="middle" fill="white" font-size="12">Frame {frame_number} - {size} bytes</text>
<text x="160" y="80" text-anchor="middle" fill="white" font-size="10">Data signature: {signature}</text>
<circle cx="160" cy="150" r="40" fill="hsl({accent},70%,60%)"/>
<text x="160" y="155" text-anchor="middle" fill="white" font-size="12">LIVE</text>
</svg>"#,
            size = frame.len(),
            accent = (hue + 180) % 360,
        )
    }

    fn test_pattern(frame_number: u64) -> String {
        let hue = (frame_number * 5 % 360) as u32;
        format!(
            r#"<svg width="320" height="240" xmlns="http://www.w3.org/2000/svg">
<rect width="100%" height="100%" fill="hsl({hue},50%,30%)"/>
<circle cx="160" cy="120" r="50" fill="hsl({accent},80%,60%)"/>
<text x="160" y="130" text-anchor="middle" fill="white" font-size="16">Frame {frame_number}</text>
</svg>"#,
            accent = (hue + 180) % 360,
        )
    }
}

impl FrameRenderer for SignaturePreview {
    fn render(&self, frame: &[u8], frame_number: u64) -> Option<String> {
        let svg = if frame.len() > CAMERA_FRAME_THRESHOLD {
            Self::camera_card(frame, frame_number)
        } else {
            Self::test_pattern(frame_number)
        };
        Some(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    fn decode_svg(data_url: &str) -> String {
        let encoded = data_url
            .strip_prefix("data:image/svg+xml;base64,")
            .expect("svg data url");
        String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn test_no_preview() {
        assert!(NoPreview.render(&[1, 2, 3], 1).is_none());
    }

    #[test]
    fn test_large_frame_renders_camera_card() {
        let frame = vec![1u8; CAMERA_FRAME_THRESHOLD + 1];
        let svg = decode_svg(&SignaturePreview.render(&frame, 7).unwrap());

        assert!(svg.contains("CAMERA DATA"));
        assert!(svg.contains("Frame 7 - 10001 bytes"));
        // 1000 个 1 → 1000 % 360 = 280
        assert!(svg.contains("Data signature: 280"));
        assert!(svg.contains("hsl(21,60%,20%)"));
    }

    #[test]
    fn test_small_frame_renders_test_pattern() {
        let svg = decode_svg(&SignaturePreview.render(&[0u8; 100], 40).unwrap());

        assert!(svg.contains("Frame 40"));
        assert!(!svg.contains("CAMERA DATA"));
        // 40 * 5 = 200，对色 20
        assert!(svg.contains("hsl(200,50%,30%)"));
        assert!(svg.contains("hsl(20,80%,60%)"));
    }

    #[test]
    fn test_signature_window() {
        let mut frame = vec![0u8; 2_000];
        frame[1_500] = 200;
        assert_eq!(SignaturePreview::signature(&frame), 0);

        frame[0] = 200;
        frame[1] = 200;
        assert_eq!(SignaturePreview::signature(&frame), 40);
    }
}
