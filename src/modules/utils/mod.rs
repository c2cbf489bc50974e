// Copyright © 2025 rustmailer.com
// Licensed under RustMailer License Agreement v1.0
// Unauthorized copying, modification, or distribution is prohibited.

use ahash::AHashSet;

#[macro_export]
macro_rules! utc_now {
    () => {{
        use chrono::Utc;
        Utc::now().timestamp_millis()
    }};
}

#[macro_export]
macro_rules! raise_error {
    ($msg:expr, $code:expr) => {
        $crate::modules::error::MailSyncError::Generic {
            message: $msg,
            location: snafu::Location::default(),
            code: $code,
        }
    };
}

#[macro_export]
macro_rules! after_n_days_timestamp {
    ($start_ts:expr, $days:expr) => {{
        const MILLIS_PER_DAY: i64 = 86_400_000; // 24 * 60 * 60 * 1000
        $start_ts + ($days as i64) * MILLIS_PER_DAY
    }};
}

/// Splits UIDs into chunks of `chunk_size` and compresses each chunk into an
/// IMAP sequence-set string.
///
/// ```text
/// [1, 2, 3, 5, 6, 7, 9, 10, 11, 15] with chunk_size 6
///   -> ["1:3,5:7", "9:11,15"]
/// ```
pub fn generate_uid_sequence(nums: Vec<u32>, chunk_size: usize, desc: bool) -> Vec<String> {
    assert!(!nums.is_empty());
    let unique_nums: AHashSet<u32> = nums.into_iter().collect();
    let mut nums: Vec<u32> = unique_nums.into_iter().collect();
    nums.sort_unstable();
    if desc {
        nums.reverse();
    }

    let mut result = Vec::new();
    for chunk in nums.chunks(chunk_size) {
        result.push(compress_uid_list(chunk.to_vec()));
    }
    result
}

pub fn compress_uid_list(nums: Vec<u32>) -> String {
    if nums.is_empty() {
        return String::new();
    }

    let mut sorted_nums = nums;
    sorted_nums.sort_unstable();

    let mut result = Vec::new();
    let mut current_range_start = sorted_nums[0];
    let mut current_range_end = sorted_nums[0];

    for &n in sorted_nums.iter().skip(1) {
        if n == current_range_end + 1 {
            current_range_end = n;
        } else {
            if current_range_start == current_range_end {
                result.push(current_range_start.to_string());
            } else {
                result.push(format!("{}:{}", current_range_start, current_range_end));
            }
            current_range_start = n;
            current_range_end = n;
        }
    }

    if current_range_start == current_range_end {
        result.push(current_range_start.to_string());
    } else {
        result.push(format!("{}:{}", current_range_start, current_range_end));
    }

    result.join(",")
}
