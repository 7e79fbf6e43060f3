use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhotoOrderError {
    #[error("mainImageIndex must be a non-negative integer")]
    InvalidIndex,
    #[error("Cannot set mainImageIndex when no photos are provided")]
    NoPhotos,
    #[error("mainImageIndex must be between 0 and {max}")]
    OutOfRange { max: usize },
}

/// Moves the chosen photo to the front, keeping the others in order.
///
/// A missing or blank index leaves the list untouched.
pub fn apply_main_image_index(
    mut photo_urls: Vec<String>,
    raw_index: Option<&str>,
) -> Result<Vec<String>, PhotoOrderError> {
    let raw = match raw_index.map(str::trim) {
        None | Some("") => return Ok(photo_urls),
        Some(raw) => raw,
    };

    let index = parse_index(raw).ok_or(PhotoOrderError::InvalidIndex)?;
    if photo_urls.is_empty() {
        return Err(PhotoOrderError::NoPhotos);
    }
    if index >= photo_urls.len() {
        return Err(PhotoOrderError::OutOfRange {
            max: photo_urls.len() - 1,
        });
    }

    photo_urls[..=index].rotate_right(1);
    Ok(photo_urls)
}

/// Accepts `2` and `2.0`, rejects fractions, negatives and garbage.
fn parse_index(raw: &str) -> Option<usize> {
    if let Ok(index) = raw.parse::<usize>() {
        return Some(index);
    }
    let parsed: f64 = raw.parse().ok()?;
    if parsed.is_finite() && parsed >= 0.0 && parsed.fract() == 0.0 && parsed <= usize::MAX as f64 {
        Some(parsed as usize)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("photo-{i}")).collect()
    }

    #[test]
    fn moves_chosen_photo_first_and_keeps_the_rest_in_order() {
        let reordered = apply_main_image_index(urls(4), Some("2")).unwrap();
        assert_eq!(reordered, vec!["photo-2", "photo-0", "photo-1", "photo-3"]);
    }

    #[test]
    fn zero_and_missing_index_are_no_ops() {
        assert_eq!(apply_main_image_index(urls(3), Some("0")).unwrap(), urls(3));
        assert_eq!(apply_main_image_index(urls(3), None).unwrap(), urls(3));
        assert_eq!(apply_main_image_index(urls(3), Some("  ")).unwrap(), urls(3));
        assert_eq!(apply_main_image_index(Vec::new(), None).unwrap(), Vec::<String>::new());
    }

    #[test]
    fn last_index_moves_to_front() {
        let reordered = apply_main_image_index(urls(3), Some("2.0")).unwrap();
        assert_eq!(reordered, vec!["photo-2", "photo-0", "photo-1"]);
    }

    #[test]
    fn rejects_bad_indices() {
        assert_eq!(
            apply_main_image_index(urls(3), Some("-1")).unwrap_err(),
            PhotoOrderError::InvalidIndex
        );
        assert_eq!(
            apply_main_image_index(urls(3), Some("1.5")).unwrap_err(),
            PhotoOrderError::InvalidIndex
        );
        assert_eq!(
            apply_main_image_index(Vec::new(), Some("0")).unwrap_err(),
            PhotoOrderError::NoPhotos
        );

        let err = apply_main_image_index(urls(4), Some("4")).unwrap_err();
        assert_eq!(err, PhotoOrderError::OutOfRange { max: 3 });
        assert_eq!(err.to_string(), "mainImageIndex must be between 0 and 3");
    }
}
