use crate::error_code::ErrorCode;

const WIDE: i64 = 16;
const NARROW: i64 = 9;
const TOLERANCE: i64 = 10;

/// Orientation bucket for a video frame, judged against 16:9
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum AspectRatio {
    Landscape,
    Portrait,
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
#[error("Invalid dimensions {width}x{height}, both must be positive")]
pub(crate) struct InvalidDimensions {
    pub(crate) width: i64,
    pub(crate) height: i64,
}

impl InvalidDimensions {
    pub(crate) const fn error_code(&self) -> ErrorCode {
        ErrorCode::INVALID_DIMENSIONS
    }
}

impl AspectRatio {
    pub(crate) const fn as_str(&self) -> &'static str {
        match self {
            Self::Landscape => "landscape",
            Self::Portrait => "portrait",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket a frame by its pixel dimensions
///
/// The longer side is divided by 16 with truncating integer division, and the frame matches 16:9
/// when nine of those units land within 10 pixels of the shorter side. Square frames are checked
/// as portrait.
pub(crate) fn classify(width: i64, height: i64) -> Result<AspectRatio, InvalidDimensions> {
    if width <= 0 || height <= 0 {
        return Err(InvalidDimensions { width, height });
    }

    if width > height {
        if near_sixteen_nine(width, height) {
            Ok(AspectRatio::Landscape)
        } else {
            Ok(AspectRatio::Other)
        }
    } else if near_sixteen_nine(height, width) {
        Ok(AspectRatio::Portrait)
    } else {
        Ok(AspectRatio::Other)
    }
}

fn near_sixteen_nine(long: i64, short: i64) -> bool {
    let unit = long / WIDE;
    let scaled = unit * NARROW;

    // both sides are positive, so the difference cannot overflow
    (scaled - short).abs() <= TOLERANCE
}

#[cfg(test)]
mod tests {
    use super::{classify, AspectRatio, InvalidDimensions};

    #[test]
    fn full_hd_landscape() {
        assert_eq!(classify(1920, 1080), Ok(AspectRatio::Landscape));
    }

    #[test]
    fn full_hd_portrait() {
        assert_eq!(classify(1080, 1920), Ok(AspectRatio::Portrait));
    }

    #[test]
    fn square_is_checked_as_portrait() {
        // 1000 / 16 = 62, 62 * 9 = 558, outside 990..=1010
        assert_eq!(classify(1000, 1000), Ok(AspectRatio::Other));
    }

    #[test]
    fn four_three_is_other() {
        assert_eq!(classify(640, 480), Ok(AspectRatio::Other));
        assert_eq!(classify(480, 640), Ok(AspectRatio::Other));
    }

    #[test]
    fn common_resolutions() {
        let cases = [
            (3840, 2160, AspectRatio::Landscape),
            (1280, 720, AspectRatio::Landscape),
            (854, 480, AspectRatio::Landscape),
            (720, 1280, AspectRatio::Portrait),
            (2160, 3840, AspectRatio::Portrait),
            (1080, 1080, AspectRatio::Other),
            (2560, 1080, AspectRatio::Other),
        ];

        for (width, height, expected) in cases {
            assert_eq!(
                classify(width, height),
                Ok(expected),
                "{width}x{height} should be {expected}"
            );
        }
    }

    #[test]
    fn landscape_tolerance_boundaries() {
        let width = 1920;
        let scaled = (width / 16) * 9;

        assert_eq!(classify(width, scaled - 10), Ok(AspectRatio::Landscape));
        assert_eq!(classify(width, scaled + 10), Ok(AspectRatio::Landscape));
        assert_eq!(classify(width, scaled - 11), Ok(AspectRatio::Other));
        assert_eq!(classify(width, scaled + 11), Ok(AspectRatio::Other));
    }

    #[test]
    fn portrait_tolerance_boundaries() {
        let height = 1920;
        let scaled = (height / 16) * 9;

        assert_eq!(classify(scaled - 10, height), Ok(AspectRatio::Portrait));
        assert_eq!(classify(scaled + 10, height), Ok(AspectRatio::Portrait));
        assert_eq!(classify(scaled - 11, height), Ok(AspectRatio::Other));
        assert_eq!(classify(scaled + 11, height), Ok(AspectRatio::Other));
    }

    #[test]
    fn truncating_division() {
        // 1935 / 16 truncates to 120, so the window is still centered on 1080
        assert_eq!(classify(1935, 1090), Ok(AspectRatio::Landscape));
        assert_eq!(classify(1935, 1091), Ok(AspectRatio::Other));
    }

    #[test]
    fn tiny_frames() {
        // 15 / 16 truncates to zero, and 0 is within 10 pixels of a 9 pixel side
        assert_eq!(classify(15, 9), Ok(AspectRatio::Landscape));
        assert_eq!(classify(9, 15), Ok(AspectRatio::Portrait));
    }

    #[test]
    fn rejects_non_positive_dimensions() {
        for (width, height) in [(0, 1080), (1920, 0), (0, 0), (-1920, 1080), (1920, -1080)] {
            assert_eq!(
                classify(width, height),
                Err(InvalidDimensions { width, height })
            );
        }
    }

    #[test]
    fn total_over_positive_inputs() {
        for width in (1..2000).step_by(37) {
            for height in (1..2000).step_by(41) {
                let first = classify(width, height).expect("Positive dimensions");
                let second = classify(width, height).expect("Positive dimensions");

                assert_eq!(first, second);
                assert!(matches!(
                    first,
                    AspectRatio::Landscape | AspectRatio::Portrait | AspectRatio::Other
                ));
            }
        }
    }

    #[test]
    fn extreme_dimensions() {
        assert_eq!(classify(i64::MAX, i64::MAX - 5), Ok(AspectRatio::Other));
        assert_eq!(classify(i64::MAX - 5, i64::MAX), Ok(AspectRatio::Other));
        assert_eq!(classify(i64::MAX, 1), Ok(AspectRatio::Other));
        assert_eq!(classify(1, i64::MAX), Ok(AspectRatio::Other));

        let long = i64::MAX;
        let short = (long / 16) * 9;
        assert_eq!(classify(long, short), Ok(AspectRatio::Landscape));
        assert_eq!(classify(short + 10, long), Ok(AspectRatio::Portrait));
    }

    #[test]
    fn labels() {
        assert_eq!(AspectRatio::Landscape.to_string(), "landscape");
        assert_eq!(AspectRatio::Portrait.to_string(), "portrait");
        assert_eq!(AspectRatio::Other.to_string(), "other");
    }
}
