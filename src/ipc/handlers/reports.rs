use crate::calendar;
use crate::ipc::handlers::auth::{self, Role};
use crate::ipc::handlers::{admin, marks, timetable};
use crate::ipc::helpers::{optional_str, required_str, respond, HandlerErr};
use crate::ipc::types::{AppState, Request};
use crate::report;
use chrono::{Datelike, Utc};
use rusqlite::Connection;
use serde_json::json;
use std::collections::HashMap;

fn attendance_map(
    conn: &Connection,
    student_id: &str,
    class_id: &str,
) -> Result<HashMap<String, String>, HandlerErr> {
    let mut map: HashMap<String, String> = HashMap::new();
    let mut stmt = conn
        .prepare("SELECT date, status FROM attendance_records WHERE student_id = ?")
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map([student_id], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for (date, status) in rows {
        map.insert(date, status);
    }
    let mut hstmt = conn
        .prepare("SELECT date FROM attendance_days WHERE class_id = ? AND is_holiday = 1")
        .map_err(HandlerErr::db_query)?;
    let holidays = hstmt
        .query_map([class_id], |r| r.get::<_, String>(0))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    for date in holidays {
        map.insert(date, "holiday".to_string());
    }
    Ok(map)
}

fn student_profile(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let (ctx, class_id) = auth::require_student(conn, params)?;
    let profile = admin::student_profile_json(conn, &ctx.user_id)?;
    let map = attendance_map(conn, &ctx.user_id, &class_id)?;

    let today = Utc::now().date_naive();
    let (ly, lm) = calendar::month_nav(today.year(), today.month()).0;
    let last_month_prefix = format!("{:04}-{:02}-", ly, lm);
    let last_month = calendar::month_stats(
        map.iter()
            .filter(|(date, _)| date.starts_with(&last_month_prefix))
            .map(|(_, s)| s.as_str()),
    );
    let overall = calendar::month_stats(map.values().map(|s| s.as_str()));

    let exams = admin::exam_results_json(conn, &class_id, &ctx.user_id, true)?;

    Ok(json!({
        "profile": profile,
        "attendanceMap": map,
        "stats": {
            "lastMonthPercent": last_month.percent,
            "overallPercent": overall.percent,
        },
        "exams": exams,
        "timetable": timetable::timetable_json(conn, &class_id)?,
    }))
}

fn card_model(
    conn: &Connection,
    params: &serde_json::Value,
) -> Result<serde_json::Value, HandlerErr> {
    let ctx = auth::require_session(conn, params)?;
    let exam_id = required_str(params, "examId")?;
    let exam = marks::load_exam(conn, &exam_id)?;

    let student_id = match ctx.role {
        Role::Student => {
            // Students print their own card, and only once results are live.
            if let Some(other) = optional_str(params, "studentId") {
                if other != ctx.user_id {
                    return Err(HandlerErr::forbidden("cannot fetch another report card"));
                }
            }
            if !exam.is_published {
                return Err(HandlerErr::forbidden("results are not published yet"));
            }
            ctx.user_id.clone()
        }
        Role::Teacher => {
            let (_ctx, assigned) = auth::require_class_teacher(conn, params)?;
            if assigned != exam.class_id {
                return Err(HandlerErr::forbidden("exam belongs to another class"));
            }
            required_str(params, "studentId")?
        }
        Role::Admin => required_str(params, "studentId")?,
    };

    let profile = admin::student_profile_json(conn, &student_id)?;
    if profile["classId"].as_str() != Some(exam.class_id.as_str()) {
        return Err(HandlerErr::not_found("student not in the exam's class"));
    }

    let mut stmt = conn
        .prepare(
            "SELECT sub.name, m.marks
             FROM exam_marks m JOIN subjects sub ON sub.code = m.subject_code
             WHERE m.exam_id = ? AND m.student_id = ?
             ORDER BY sub.sort_order, sub.code",
        )
        .map_err(HandlerErr::db_query)?;
    let rows = stmt
        .query_map((&exam.id, &student_id), |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<f64>>(1)?))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db_query)?;
    let marks_rows: Vec<report::MarksRow> = rows
        .into_iter()
        .map(|(subject, marks)| report::MarksRow {
            subject,
            marks: marks.unwrap_or(0.0),
            out_of: exam.max_marks,
        })
        .collect();
    if marks_rows.is_empty() {
        return Err(HandlerErr::not_found("no marks recorded for this exam"));
    }

    let card_profile = report::CardProfile {
        name: profile["name"].as_str().unwrap_or("").to_string(),
        class_name: profile["className"].as_str().unwrap_or("").to_string(),
        roll_no: profile["rollNo"].as_i64(),
        dob: profile["dob"].as_str().map(|s| s.to_string()),
        father_name: profile["fatherName"].as_str().map(|s| s.to_string()),
        mother_name: profile["motherName"].as_str().map(|s| s.to_string()),
        teacher_name: profile["teacherName"].as_str().unwrap_or("-").to_string(),
    };
    let card = report::build(
        &card_profile,
        &exam.name,
        exam.max_marks,
        marks_rows,
        Utc::now().date_naive(),
    );

    Ok(json!({
        "studentId": student_id,
        "examId": exam.id,
        "profilePic": profile["profilePic"],
        "card": serde_json::to_value(&card)
            .map_err(|e| HandlerErr::new("encode_failed", e.to_string()))?,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "student.profile" => Some(respond(state, req, student_profile)),
        "reports.cardModel" => Some(respond(state, req, card_model)),
        _ => None,
    }
}
