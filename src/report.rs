use crate::calendar;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// A4 in millimetres, the page the renderer lays the card out on.
pub const PAGE_WIDTH: f64 = 210.0;
pub const PAGE_HEIGHT: f64 = 297.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    Playful,
    Standard,
    Professional,
}

fn playful_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)Nur|K1|K2|LKG|UKG").expect("playful class pattern"))
}

fn senior_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(6|7|8|9|10|11|12)").expect("senior class pattern"))
}

/// Pick the visual template from the class name: pre-primary classes get the
/// playful card, classes 6 and above the professional one, everyone else the
/// standard layout.
pub fn select_template(class_name: &str) -> Template {
    let name = class_name.trim();
    if playful_pattern().is_match(name) {
        Template::Playful
    } else if senior_pattern().is_match(name) {
        Template::Professional
    } else {
        Template::Standard
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub label: String,
    pub value: String,
    pub label_x: f64,
    pub value_x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarksRow {
    pub subject: String,
    pub marks: f64,
    pub out_of: f64,
}

#[derive(Debug, Clone)]
pub struct CardProfile {
    pub name: String,
    pub class_name: String,
    pub roll_no: Option<i64>,
    pub dob: Option<String>,
    pub father_name: Option<String>,
    pub mother_name: Option<String>,
    pub teacher_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCard {
    pub template: Template,
    pub page_width: f64,
    pub page_height: f64,
    pub session: String,
    pub title: String,
    pub exam_name: String,
    /// Outer frame (playful) or identity box (standard); professional cards
    /// draw rules instead and carry no frame.
    pub frame: Option<Rect>,
    pub identity_box: Rect,
    pub photo: Rect,
    pub fields: Vec<Field>,
    pub table_start_y: f64,
    pub columns: [String; 3],
    pub rows: Vec<MarksRow>,
    pub total_obtained: f64,
    pub total_max: f64,
    pub teacher_name: String,
}

fn text(label: &str, value: impl Into<String>, label_x: f64, value_x: f64, y: f64) -> Field {
    Field {
        label: label.to_string(),
        value: value.into(),
        label_x,
        value_x,
        y,
    }
}

fn dash(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "-".to_string())
}

/// Lay out a report card for one exam. `today` anchors the academic session
/// label; callers pass the current date.
pub fn build(
    profile: &CardProfile,
    exam_name: &str,
    max_per_subject: f64,
    rows: Vec<MarksRow>,
    today: NaiveDate,
) -> ReportCard {
    let template = select_template(&profile.class_name);
    let total_obtained: f64 = rows.iter().map(|r| r.marks).sum();
    let total_max = max_per_subject * rows.len() as f64;
    let roll = profile
        .roll_no
        .map(|r| r.to_string())
        .unwrap_or_else(|| "-".to_string());

    // Header band is fixed; the identity block starts below it.
    let y = 60.0;

    let (frame, identity_box, photo, fields) = match template {
        Template::Playful => {
            let gap = 9.0;
            let (c1, c1v) = (60.0, 75.0);
            let (c2, c2v) = (120.0, 138.0);
            (
                Some(Rect {
                    x: 5.0,
                    y: 5.0,
                    w: PAGE_WIDTH - 10.0,
                    h: PAGE_HEIGHT - 10.0,
                }),
                Rect {
                    x: 10.0,
                    y,
                    w: PAGE_WIDTH - 20.0,
                    h: 55.0,
                },
                Rect {
                    x: 15.0,
                    y: y + 7.0,
                    w: 40.0,
                    h: 40.0,
                },
                vec![
                    text("Name", profile.name.clone(), c1, c1v, y + 12.0),
                    text("Class", profile.class_name.clone(), c1, c1v, y + 12.0 + gap),
                    text("Roll No", roll, c1, c1v, y + 12.0 + gap * 2.0),
                    text("DOB", dash(&profile.dob), c1, c1v, y + 12.0 + gap * 3.0),
                    text("Father", dash(&profile.father_name), c2, c2v, y + 12.0),
                    text(
                        "Mother",
                        dash(&profile.mother_name),
                        c2,
                        c2v,
                        y + 12.0 + gap,
                    ),
                    text(
                        "Teacher",
                        profile.teacher_name.clone(),
                        c2,
                        c2v,
                        y + 12.0 + gap * 2.0,
                    ),
                ],
            )
        }
        Template::Standard => {
            let line = 10.0;
            (
                None,
                Rect {
                    x: 15.0,
                    y,
                    w: PAGE_WIDTH - 30.0,
                    h: 50.0,
                },
                Rect {
                    x: PAGE_WIDTH - 45.0,
                    y: y + 5.0,
                    w: 35.0,
                    h: 40.0,
                },
                vec![
                    text("Name", profile.name.clone(), 20.0, 45.0, y + 12.0),
                    text(
                        "Class",
                        profile.class_name.clone(),
                        20.0,
                        45.0,
                        y + 12.0 + line,
                    ),
                    text("Roll No", roll, 20.0, 45.0, y + 12.0 + line * 2.0),
                    text(
                        "DOB",
                        dash(&profile.dob),
                        20.0,
                        45.0,
                        y + 12.0 + line * 3.0,
                    ),
                    text("Father", dash(&profile.father_name), 90.0, 110.0, y + 12.0),
                    text(
                        "Mother",
                        dash(&profile.mother_name),
                        90.0,
                        110.0,
                        y + 12.0 + line,
                    ),
                    text(
                        "Teacher",
                        profile.teacher_name.clone(),
                        90.0,
                        110.0,
                        y + 12.0 + line * 2.0,
                    ),
                ],
            )
        }
        Template::Professional => {
            let (r1, r2, r3) = (y + 12.0, y + 24.0, y + 36.0);
            (
                None,
                Rect {
                    x: 15.0,
                    y,
                    w: PAGE_WIDTH - 30.0,
                    h: 50.0,
                },
                Rect {
                    x: PAGE_WIDTH - 45.0,
                    y: y + 5.0,
                    w: 30.0,
                    h: 40.0,
                },
                vec![
                    text("Name", profile.name.to_uppercase(), 20.0, 60.0, r1),
                    text("Class", profile.class_name.clone(), 20.0, 60.0, r2),
                    text("Roll No", roll, 20.0, 60.0, r3),
                    text("Father", dash(&profile.father_name), 100.0, 140.0, r1),
                    text("Teacher", profile.teacher_name.clone(), 100.0, 140.0, r2),
                    text("DOB", dash(&profile.dob), 100.0, 140.0, r3),
                ],
            )
        }
    };

    ReportCard {
        template,
        page_width: PAGE_WIDTH,
        page_height: PAGE_HEIGHT,
        session: calendar::session_label(today),
        title: format!("REPORT CARD: {}", exam_name.to_uppercase()),
        exam_name: exam_name.to_string(),
        frame,
        identity_box,
        photo,
        fields,
        table_start_y: y + 60.0,
        columns: [
            "Subject".to_string(),
            "Marks Obtained".to_string(),
            "Max Marks".to_string(),
        ],
        rows,
        total_obtained,
        total_max,
        teacher_name: profile.teacher_name.clone(),
    }
}
