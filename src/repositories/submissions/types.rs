pub(crate) const COLUMNS: &str = "\
    id, exam_id, student_id, answers, answer_images, evaluated_images, is_evaluated, \
    total_marks, feedback, grade, evaluated_by, evaluated_at, evaluation_count, revision, \
    submitted_at, updated_at";
