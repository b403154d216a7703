//! Regex patterns for ID-card field extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Student number, e.g. 1284-21
    pub static ref STUDENT_NO: Regex = Regex::new(r"\b\d{4}-\d{2}\b").unwrap();

    // Two or more consecutive digits never appear in a name
    pub static ref DIGIT_RUN: Regex = Regex::new(r"\d{2,}").unwrap();

    // Degree program code anywhere in a line, e.g. BSCPE, BSIT, ABCOMM
    pub static ref COURSE_CODE: Regex = Regex::new(
        r"\b(?:BS[A-Z]{2,4}|BA[A-Z]{2,4}|AB[A-Z]{2,4}|BSC[A-Z]{2,4})\b"
    ).unwrap();

    // A line that is exactly a degree program code
    pub static ref COURSE_LINE: Regex = Regex::new(r"^(?:BS|BA|AB)[A-Z]{2,4}$").unwrap();

    // Year level, e.g. THIRD YEAR, 2ND YEAR
    pub static ref YEAR_LEVEL: Regex = Regex::new(
        r"\b(?:FIRST|SECOND|THIRD|FOURTH|1ST|2ND|3RD|4TH)\s*YEAR\b"
    ).unwrap();
}
