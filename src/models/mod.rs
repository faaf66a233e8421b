pub mod announcement;
pub mod class;
pub mod course;
pub mod grade;

pub use announcement::{AnnouncementDetail, AnnouncementSummary, NewAnnouncementRequest};
pub use class::{Class, NewClassRequest};
pub use course::{
    Course, CourseStatus, CourseType, CourseWithTeacher, DayOfWeek, NewCourseRequest,
    SearchCoursesQuery,
};
pub use grade::{ClassScore, CourseResult, GetGradeResponse, Summary};
