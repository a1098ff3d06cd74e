use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Taking,
    Edit,
}

impl Mode {
    pub fn parse(s: &str) -> Option<Mode> {
        match s {
            "taking" => Some(Mode::Taking),
            "edit" => Some(Mode::Edit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mark {
    Present,
    Absent,
}

impl Mark {
    pub fn parse(s: &str) -> Option<Mark> {
        match s {
            "present" => Some(Mark::Present),
            "absent" => Some(Mark::Absent),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mark::Present => "present",
            Mark::Absent => "absent",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub student_id: String,
    pub name: String,
    pub roll_no: Option<i64>,
    pub login_id: String,
    pub profile_pic: Option<String>,
}

/// One attendance-taking run for a class and date. The roster is a snapshot
/// and choices live in an in-memory buffer; nothing persists until submit,
/// so cancelling (or dropping the daemon) loses the run.
#[derive(Debug)]
pub struct TakeSession {
    pub class_id: String,
    pub date: String,
    pub mode: Mode,
    roster: Vec<RosterEntry>,
    buffer: HashMap<String, Mark>,
    cursor: usize,
}

impl TakeSession {
    pub fn new(
        class_id: String,
        date: String,
        mode: Mode,
        roster: Vec<RosterEntry>,
        already_marked: HashMap<String, Mark>,
    ) -> TakeSession {
        // Taking mode resumes at the first unmarked student; edit mode
        // always reviews from the top.
        let cursor = match mode {
            Mode::Taking => roster
                .iter()
                .position(|e| !already_marked.contains_key(&e.student_id))
                .unwrap_or(0),
            Mode::Edit => 0,
        };
        TakeSession {
            class_id,
            date,
            mode,
            roster,
            buffer: already_marked,
            cursor,
        }
    }

    pub fn current(&self) -> Option<&RosterEntry> {
        self.roster.get(self.cursor)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor >= self.roster.len()
    }

    /// Buffer a mark for the student under the cursor and step forward.
    pub fn mark(&mut self, mark: Mark) -> Result<(), &'static str> {
        let Some(entry) = self.roster.get(self.cursor) else {
            return Err("all students already marked");
        };
        self.buffer.insert(entry.student_id.clone(), mark);
        self.cursor += 1;
        Ok(())
    }

    /// Step the cursor back one card. The buffered mark stays until the
    /// student is swiped again.
    pub fn undo(&mut self) -> bool {
        if self.cursor > 0 {
            self.cursor -= 1;
            true
        } else {
            false
        }
    }

    /// Direct toggle used by the review/edit list.
    pub fn set(&mut self, student_id: &str, mark: Mark) -> Result<(), &'static str> {
        if !self.roster.iter().any(|e| e.student_id == student_id) {
            return Err("student not in roster");
        }
        self.buffer.insert(student_id.to_string(), mark);
        Ok(())
    }

    /// The batch payload: buffered marks in roster order. Students never
    /// marked stay pending and are excluded.
    pub fn records(&self) -> Vec<(String, Mark)> {
        self.roster
            .iter()
            .filter_map(|e| {
                self.buffer
                    .get(&e.student_id)
                    .map(|m| (e.student_id.clone(), *m))
            })
            .collect()
    }

    pub fn state_json(&self) -> serde_json::Value {
        let statuses: Vec<serde_json::Value> = self
            .roster
            .iter()
            .map(|e| {
                let status = self
                    .buffer
                    .get(&e.student_id)
                    .map(|m| m.as_str())
                    .unwrap_or("pending");
                json!({
                    "studentId": e.student_id,
                    "name": e.name,
                    "rollNo": e.roll_no,
                    "loginId": e.login_id,
                    "profilePic": e.profile_pic,
                    "status": status,
                })
            })
            .collect();
        json!({
            "classId": self.class_id,
            "date": self.date,
            "mode": self.mode,
            "cursor": self.cursor,
            "total": self.roster.len(),
            "markedCount": self.buffer.len(),
            "complete": self.is_complete(),
            "current": self.current(),
            "students": statuses,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(n: usize) -> Vec<RosterEntry> {
        (0..n)
            .map(|i| RosterEntry {
                student_id: format!("s{}", i),
                name: format!("Student {}", i),
                roll_no: Some(i as i64 + 1),
                login_id: format!("STU{}", i),
                profile_pic: None,
            })
            .collect()
    }

    #[test]
    fn taking_starts_at_first_pending() {
        let mut marked = HashMap::new();
        marked.insert("s0".to_string(), Mark::Present);
        marked.insert("s1".to_string(), Mark::Absent);
        let s = TakeSession::new(
            "c1".into(),
            "2025-08-05".into(),
            Mode::Taking,
            roster(4),
            marked,
        );
        assert_eq!(s.current().unwrap().student_id, "s2");
    }

    #[test]
    fn edit_starts_at_zero_even_when_all_marked() {
        let mut marked = HashMap::new();
        for i in 0..3 {
            marked.insert(format!("s{}", i), Mark::Present);
        }
        let s = TakeSession::new(
            "c1".into(),
            "2025-08-05".into(),
            Mode::Edit,
            roster(3),
            marked,
        );
        assert_eq!(s.current().unwrap().student_id, "s0");
    }

    #[test]
    fn mark_advances_and_undo_steps_back() {
        let mut s = TakeSession::new(
            "c1".into(),
            "2025-08-05".into(),
            Mode::Taking,
            roster(2),
            HashMap::new(),
        );
        s.mark(Mark::Present).unwrap();
        assert_eq!(s.current().unwrap().student_id, "s1");
        assert!(s.undo());
        assert_eq!(s.current().unwrap().student_id, "s0");
        // Re-swiping overwrites the earlier choice.
        s.mark(Mark::Absent).unwrap();
        s.mark(Mark::Present).unwrap();
        assert!(s.is_complete());
        assert!(s.mark(Mark::Present).is_err());
        let records = s.records();
        assert_eq!(records[0], ("s0".to_string(), Mark::Absent));
        assert_eq!(records[1], ("s1".to_string(), Mark::Present));
    }

    #[test]
    fn unmarked_students_stay_out_of_the_batch() {
        let mut s = TakeSession::new(
            "c1".into(),
            "2025-08-05".into(),
            Mode::Taking,
            roster(3),
            HashMap::new(),
        );
        s.mark(Mark::Present).unwrap();
        // s1 and s2 never swiped.
        let records = s.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0, "s0");
    }

    #[test]
    fn set_rejects_unknown_students() {
        let mut s = TakeSession::new(
            "c1".into(),
            "2025-08-05".into(),
            Mode::Edit,
            roster(2),
            HashMap::new(),
        );
        assert!(s.set("s1", Mark::Absent).is_ok());
        assert!(s.set("ghost", Mark::Present).is_err());
        assert_eq!(s.records().len(), 1);
    }
}
