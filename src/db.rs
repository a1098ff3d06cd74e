use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE: &str = "schoolhub.sqlite3";
pub const ASSETS_DIR: &str = "assets";

/// Default subject catalogue seeded into a fresh workspace. Admins can
/// extend it with `subjects.upsert`.
const DEFAULT_SUBJECTS: &[(&str, &str)] = &[
    ("HIN", "Hindi"),
    ("ENG", "English"),
    ("MAT", "Mathematics"),
    ("SCI", "Science"),
    ("SST", "Social Studies"),
    ("CMP", "Computer"),
    ("GK", "General Knowledge"),
    ("ART", "Drawing"),
];

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    std::fs::create_dir_all(workspace.join(ASSETS_DIR))?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS admins(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            login_id TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            contact TEXT,
            level INTEGER NOT NULL DEFAULT 2,
            profile_pic TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            login_id TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            contact TEXT,
            assigned_class_id TEXT,
            subject_code TEXT,
            profile_pic TEXT,
            FOREIGN KEY(assigned_class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            roll_no INTEGER,
            login_id TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            dob TEXT,
            father_name TEXT,
            mother_name TEXT,
            contact TEXT,
            address TEXT,
            admission_year INTEGER,
            profile_pic TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id),
            UNIQUE(class_id, login_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    ensure_students_admission_year(&conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS subjects(
            code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token TEXT PRIMARY KEY,
            role TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_days(
            class_id TEXT NOT NULL,
            date TEXT NOT NULL,
            is_holiday INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY(class_id, date),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS attendance_records(
            class_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            date TEXT NOT NULL,
            status TEXT NOT NULL,
            PRIMARY KEY(class_id, student_id, date),
            FOREIGN KEY(class_id) REFERENCES classes(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_student
         ON attendance_records(student_id, date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attendance_records_class_date
         ON attendance_records(class_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS exams(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            name TEXT NOT NULL,
            max_marks_per_subject REAL NOT NULL,
            is_published INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exam_marks(
            exam_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            subject_code TEXT NOT NULL,
            marks REAL,
            PRIMARY KEY(exam_id, student_id, subject_code),
            FOREIGN KEY(exam_id) REFERENCES exams(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_exam_marks_student ON exam_marks(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS timetable_slots(
            class_id TEXT NOT NULL,
            day TEXT NOT NULL,
            period INTEGER NOT NULL,
            subject_code TEXT NOT NULL,
            PRIMARY KEY(class_id, day, period),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS post_batches(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            post_date TEXT NOT NULL,
            post_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS post_batch_classes(
            batch_id TEXT NOT NULL,
            class_id TEXT,
            all_classes INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(batch_id) REFERENCES post_batches(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS post_items(
            id TEXT PRIMARY KEY,
            batch_id TEXT NOT NULL,
            item_type TEXT NOT NULL,
            heading TEXT NOT NULL,
            content TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(batch_id) REFERENCES post_batches(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS post_item_files(
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            path TEXT NOT NULL,
            FOREIGN KEY(item_id) REFERENCES post_items(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS post_defaulters(
            item_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            PRIMARY KEY(item_id, student_id),
            FOREIGN KEY(item_id) REFERENCES post_items(id),
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_post_items_batch ON post_items(batch_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_post_batch_classes_batch
         ON post_batch_classes(batch_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notices(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            image_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS updates(
            id TEXT PRIMARY KEY,
            update_text TEXT NOT NULL,
            image_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events(
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            event_date TEXT NOT NULL,
            image_url TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS whats_today(
            id TEXT PRIMARY KEY,
            image_url TEXT NOT NULL,
            posted_on TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS slides(
            id TEXT PRIMARY KEY,
            img_url TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS thoughts(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            position TEXT NOT NULL,
            quote TEXT NOT NULL,
            image_url TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS gallery_photos(
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            caption TEXT,
            image_url TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS gallery_videos(
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            caption TEXT,
            video_url TEXT NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS toppers(
            class_id TEXT NOT NULL,
            rank INTEGER NOT NULL,
            student_id TEXT,
            percentage TEXT,
            PRIMARY KEY(class_id, rank),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS class_settings(
            class_id TEXT PRIMARY KEY,
            show_toppers INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS suggestions(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            message TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    seed_subjects(&conn)?;

    Ok(conn)
}

fn seed_subjects(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM subjects", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    for (i, (code, name)) in DEFAULT_SUBJECTS.iter().enumerate() {
        conn.execute(
            "INSERT INTO subjects(code, name, sort_order) VALUES(?, ?, ?)",
            (code, name, i as i64),
        )?;
    }
    Ok(())
}

fn ensure_students_admission_year(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before the profile expansion lack this column.
    if table_has_column(conn, "students", "admission_year")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE students ADD COLUMN admission_year INTEGER", [])?;
    Ok(())
}

pub fn settings_get(conn: &Connection, key: &str) -> anyhow::Result<Option<String>> {
    use rusqlite::OptionalExtension;
    let v = conn
        .query_row("SELECT value FROM settings WHERE key = ?", [key], |r| {
            r.get(0)
        })
        .optional()?;
    Ok(v)
}

pub fn settings_set(conn: &Connection, key: &str, value: &str) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        (key, value),
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
